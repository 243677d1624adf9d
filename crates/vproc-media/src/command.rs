//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, FfmpegProgress};

/// Number of diagnostic stderr lines kept for error reporting.
const STDERR_TAIL_LINES: usize = 8;

#[derive(Debug, Clone)]
struct Input {
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order, each with its own leading arguments
    inputs: Vec<Input>,
    /// Arguments collected for the next input
    pending_input_args: Vec<String>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            pending_input_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input argument that applies to the next [`FfmpegCommand::input`].
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.pending_input_args.push(arg.into());
        self
    }

    /// Add multiple input arguments for the next input.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending_input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an input file.
    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(Input {
            args: std::mem::take(&mut self.pending_input_args),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    /// Add output arguments (after the inputs).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Seek before the next input (fast, keyframe accurate).
    pub fn seek_input(self, millis: u64) -> Self {
        self.input_arg("-ss").input_arg(format_seconds(millis))
    }

    /// Seek after decoding starts (slow, frame accurate).
    pub fn seek_output(self, millis: u64) -> Self {
        self.output_arg("-ss").output_arg(format_seconds(millis))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter label into the output.
    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Copy every stream without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Output file this command writes.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());
        args.push("-nostats".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

fn format_seconds(millis: u64) -> String {
    format!("{}.{:03}", millis / 1000, millis % 1000)
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
}

/// Runner for FFmpeg commands with cancellation.
///
/// The child is spawned with `kill_on_drop`, so dropping the future returned
/// by [`FfmpegRunner::run`] (for example on a timeout) also stops FFmpeg.
#[derive(Debug, Default, Clone)]
pub struct FfmpegRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { cancel_rx: None }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Run an FFmpeg command to completion.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        // Progress goes to the debug log, anything else is kept for diagnostics
        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut progress = FfmpegProgress::default();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = lines.next_line().await {
                if is_progress_line(&line) {
                    if let Some(snapshot) = progress.update(&line) {
                        debug!(
                            frame = snapshot.frame,
                            out_time_ms = snapshot.out_time_ms,
                            speed = snapshot.speed,
                            "FFmpeg progress"
                        );
                    }
                } else if !line.trim().is_empty() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }

            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let outcome = self.wait_for_completion(&mut child).await;

        let status = match outcome {
            Outcome::Exited(status) => status?,
            Outcome::Cancelled => {
                info!(output = %cmd.output_path().display(), "FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                stderr_handle.abort();
                return Err(MediaError::Cancelled);
            }
        };

        let stderr_tail = stderr_handle.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                format!("FFmpeg exited with {}", status),
                Some(stderr_tail),
                status.code(),
            ))
        }
    }

    /// Wait for the child to exit or for the cancel signal, whichever is first.
    async fn wait_for_completion(&self, child: &mut Child) -> Outcome {
        let mut cancel_rx = self.cancel_rx.clone();

        let cancelled = async move {
            let Some(rx) = cancel_rx.as_mut() else {
                return std::future::pending::<()>().await;
            };
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Sender gone without cancelling
                    return std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = cancelled => Outcome::Cancelled,
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("output.mp4")
            .seek_input(10_250)
            .input("input.mp4")
            .video_codec("libx264");

        let args = cmd.build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();

        assert_eq!(args[ss + 1], "10.250");
        assert!(ss < i);
        assert_eq!(args[i + 1], "input.mp4");
        assert_eq!(args.last().unwrap(), "output.mp4");
    }

    #[test]
    fn test_input_args_bind_to_following_input() {
        let args = FfmpegCommand::new("out.mp4")
            .input("a.mp4")
            .input_args(["-f", "concat"])
            .input("list.txt")
            .build_args();

        let first = args.iter().position(|a| a == "a.mp4").unwrap();
        let concat = args.iter().position(|a| a == "concat").unwrap();
        let second = args.iter().position(|a| a == "list.txt").unwrap();
        assert!(first < concat && concat < second);
    }

    #[test]
    fn test_seek_after_input() {
        let args = FfmpegCommand::new("thumb.jpg")
            .input("input.mp4")
            .seek_output(500)
            .single_frame()
            .build_args();

        let i = args.iter().position(|a| a == "-i").unwrap();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert!(ss > i);
        assert_eq!(args[ss + 1], "0.500");
    }

    #[test]
    fn test_cancel_signal_interrupts_wait() {
        let (tx, rx) = watch::channel(false);
        let runner = FfmpegRunner::new().with_cancel(rx);
        tx.send(true).unwrap();

        tokio_test::block_on(async {
            // Any long-running child will do
            let Ok(mut child) = Command::new("sleep").arg("5").kill_on_drop(true).spawn() else {
                return;
            };
            let outcome = runner.wait_for_completion(&mut child).await;
            assert!(matches!(outcome, Outcome::Cancelled));
        });
    }
}
