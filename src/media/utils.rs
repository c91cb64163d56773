use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Muxes a video stream and its companion audio stream into a single MP4
/// using ffmpeg. Both inputs are read straight from their URLs; no
/// re-encoding happens. ffmpeg is killed once `timeout` elapses.
pub async fn mux_video_audio(
    video_url: &str,
    audio_url: &str,
    timeout: Duration,
) -> Result<Vec<u8>> {
    info!("Muxing video {} with audio {}", video_url, audio_url);

    let mut ffmpeg = Command::new("ffmpeg");
    ffmpeg
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(video_url)
        .arg("-i")
        .arg(audio_url)
        .arg("-map")
        .arg("0:v:0")
        .arg("-map")
        .arg("1:a:0")
        .arg("-c")
        .arg("copy")
        .arg("-f")
        .arg("mp4")
        .arg("-movflags")
        .arg("frag_keyframe+empty_moov")
        .arg("pipe:1");

    let buffer = run_with_timeout(ffmpeg, timeout).await?;
    debug!("Muxed output size: {} bytes", buffer.len());
    Ok(buffer)
}

/// Runs `command` to completion and returns its stdout. The child is killed
/// when it outlives `timeout`.
async fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<Vec<u8>> {
    let mut child = command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to spawn ffmpeg")?;

    match tokio::time::timeout(timeout, collect_output(&mut child)).await {
        Ok(result) => result,
        Err(_) => {
            let _ = child.start_kill();
            Err(anyhow::anyhow!("ffmpeg timed out after {:?}", timeout))
        }
    }
}

async fn collect_output(ffmpeg: &mut tokio::process::Child) -> Result<Vec<u8>> {
    let stdout = ffmpeg
        .stdout
        .take()
        .context("Failed to get ffmpeg stdout")?;
    let stderr = ffmpeg
        .stderr
        .take()
        .context("Failed to get ffmpeg stderr")?;

    let mut stdout_reader = tokio::io::BufReader::new(stdout);
    let mut stderr_reader = tokio::io::BufReader::new(stderr);

    let mut buffer = Vec::new();
    let mut error_buffer = Vec::new();

    let (result, error) = tokio::join!(
        stdout_reader.read_to_end(&mut buffer),
        stderr_reader.read_to_end(&mut error_buffer),
    );

    result.context("Failed to read ffmpeg output")?;
    error.context("Failed to read ffmpeg stderr")?;

    let status = ffmpeg.wait().await.context("Failed to wait for ffmpeg")?;

    if !status.success() {
        let error = String::from_utf8_lossy(&error_buffer);
        return Err(anyhow::anyhow!("ffmpeg failed with {}: {}", status, error));
    }

    Ok(buffer)
}

/// Checks that ffmpeg can be launched.
pub async fn ffmpeg_available() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            let version_line = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("unknown")
                .to_string();
            info!("✅ ffmpeg is available: {}", version_line);
            true
        }
        Ok(_) => false,
        Err(_) => false,
    }
}
