use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{DecodeError, ProbeError, ToolError};

/// Duration assumed when every probe strategy fails.
pub const FALLBACK_DURATION_SECS: f64 = 15.0;

/// Sample rate for the relaxed retry extraction.
const RELAXED_SAMPLE_RATE: u32 = 22050;

/// Mono, normalized audio track of one input file. Immutable once produced;
/// discarded after feature extraction.
pub struct Waveform {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Extract the input's audio track as a mono waveform at the configured
/// sample rate, going through a temporary WAV file written by ffmpeg.
///
/// The temp file is removed on every exit path. Any failure here is
/// recoverable: the caller switches to synthetic feature generation.
pub fn extract_waveform(input: &Path, config: &Config) -> Result<Waveform, DecodeError> {
    let tmp = tempfile::Builder::new()
        .prefix("beatclock-")
        .suffix(".wav")
        .tempfile()
        .map_err(DecodeError::TempFile)?;
    let wav_path = tmp.path();

    let tool = &config.tools.ffmpeg;
    let timeout = Duration::from_secs(config.tools.timeout_secs);
    let rate = config.analysis.sample_rate.to_string();

    let primary: Vec<&OsStr> = vec![
        "-i".as_ref(),
        input.as_os_str(),
        "-vn".as_ref(),
        "-acodec".as_ref(),
        "pcm_s16le".as_ref(),
        "-ar".as_ref(),
        rate.as_ref(),
        "-ac".as_ref(),
        "1".as_ref(),
        "-y".as_ref(),
        wav_path.as_os_str(),
    ];

    let output = run_tool(tool, &primary, timeout)?;
    if !output.status.success() {
        log::warn!(
            "primary ffmpeg extraction failed (status {:?}), retrying relaxed",
            output.status.code()
        );
        let relaxed_rate = RELAXED_SAMPLE_RATE.to_string();
        let relaxed: Vec<&OsStr> = vec![
            "-i".as_ref(),
            input.as_os_str(),
            "-vn".as_ref(),
            "-ar".as_ref(),
            relaxed_rate.as_ref(),
            "-y".as_ref(),
            wav_path.as_os_str(),
        ];
        let retry = run_tool(tool, &relaxed, timeout)?;
        if !retry.status.success() {
            return Err(failure(tool, retry).into());
        }
    }

    let waveform = read_wav(wav_path)?;
    log::info!(
        "extracted {} samples at {}Hz ({:.2}s)",
        waveform.samples.len(),
        waveform.sample_rate,
        waveform.duration()
    );
    Ok(waveform)
}

/// Container duration in seconds, via layered fallbacks: format metadata,
/// then video frame count / frame rate, then a constant.
pub fn probe_duration(input: &Path, config: &Config) -> f64 {
    match probe_container_duration(input, config) {
        Ok(duration) => return duration,
        Err(err) => log::warn!("container duration probe failed: {err}"),
    }

    match probe_frame_ratio_duration(input, config) {
        Ok(duration) => return duration,
        Err(err) => log::warn!("frame-count duration probe failed: {err}"),
    }

    log::warn!("assuming constant duration of {FALLBACK_DURATION_SECS}s");
    FALLBACK_DURATION_SECS
}

fn probe_container_duration(input: &Path, config: &Config) -> Result<f64, ProbeError> {
    let tool = &config.tools.ffprobe;
    let args: Vec<&OsStr> = vec![
        "-v".as_ref(),
        "quiet".as_ref(),
        "-show_entries".as_ref(),
        "format=duration".as_ref(),
        "-of".as_ref(),
        "csv=p=0".as_ref(),
        input.as_os_str(),
    ];
    let output = run_tool(tool, &args, Duration::from_secs(config.tools.timeout_secs))?;
    if !output.status.success() {
        return Err(failure(tool, output).into());
    }
    parse_duration(&output.stdout).ok_or(ProbeError::Unparseable)
}

fn probe_frame_ratio_duration(input: &Path, config: &Config) -> Result<f64, ProbeError> {
    let tool = &config.tools.ffprobe;
    let args: Vec<&OsStr> = vec![
        "-v".as_ref(),
        "quiet".as_ref(),
        "-select_streams".as_ref(),
        "v:0".as_ref(),
        "-show_entries".as_ref(),
        "stream=nb_frames,r_frame_rate".as_ref(),
        "-of".as_ref(),
        "csv=p=0".as_ref(),
        input.as_os_str(),
    ];
    let output = run_tool(tool, &args, Duration::from_secs(config.tools.timeout_secs))?;
    if !output.status.success() {
        return Err(failure(tool, output).into());
    }
    output
        .stdout
        .lines()
        .find_map(parse_frames_and_rate)
        .ok_or(ProbeError::Unparseable)
}

#[derive(Debug)]
struct ToolOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Run an external tool with a bounded timeout, draining its pipes off-thread
/// so a chatty child cannot deadlock against the poll loop.
fn run_tool(program: &str, args: &[&OsStr], timeout: Duration) -> Result<ToolOutput, ToolError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Launch {
            tool: program.to_string(),
            source,
        })?;

    let stdout_reader = child.stdout.take().map(drain_pipe);
    let stderr_reader = child.stderr.take().map(drain_pipe);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::Timeout {
                        tool: program.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(source) => {
                let _ = child.kill();
                return Err(ToolError::Wait {
                    tool: program.to_string(),
                    source,
                });
            }
        }
    };

    let stdout = stdout_reader.map(join_pipe).unwrap_or_default();
    let stderr = stderr_reader.map(join_pipe).unwrap_or_default();

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}

fn drain_pipe<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

fn join_pipe(handle: std::thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

fn failure(tool: &str, output: ToolOutput) -> ToolError {
    ToolError::Failed {
        tool: tool.to_string(),
        code: output.status.code(),
        stderr: output.stderr.trim().to_string(),
    }
}

/// Read the extracted WAV back, downmixing to mono and normalizing to f32.
fn read_wav(path: &Path) -> Result<Waveform, DecodeError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(sanitize))
            .collect::<Result<_, hound::Error>>()?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<Result<_, hound::Error>>()?,
            24 | 32 => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| sanitize(v as f32 / scale)))
                    .collect::<Result<_, hound::Error>>()?
            }
            bits => return Err(DecodeError::UnsupportedFormat { bits }),
        },
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        raw
    } else {
        raw.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    if samples.is_empty() {
        return Err(DecodeError::EmptyStream);
    }

    Ok(Waveform {
        samples,
        sample_rate: spec.sample_rate,
    })
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

pub(crate) fn parse_duration(s: &str) -> Option<f64> {
    let duration: f64 = s.trim().parse().ok()?;
    (duration.is_finite() && duration > 0.0).then_some(duration)
}

/// Parse one csv line of `nb_frames,r_frame_rate` probe output into a
/// duration. ffprobe's field order is not guaranteed, so try both.
pub(crate) fn parse_frames_and_rate(line: &str) -> Option<f64> {
    let parts: Vec<&str> = line.trim().split(',').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return None;
    }
    frames_over_rate(parts[0], parts[1]).or_else(|| frames_over_rate(parts[1], parts[0]))
}

fn frames_over_rate(frames: &str, rate: &str) -> Option<f64> {
    let frames: u64 = frames.trim().parse().ok()?;
    let rate = parse_frame_rate(rate)?;
    (frames > 0).then(|| frames as f64 / rate)
}

/// Frame rates arrive either rational ("30000/1001") or plain ("29.97").
pub(crate) fn parse_frame_rate(s: &str) -> Option<f64> {
    let s = s.trim();
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
