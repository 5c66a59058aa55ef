//! Client for the OCR / face-detection worker process.
//!
//! The worker reads one JSON request per line on stdin and answers with one
//! JSON line on stdout:
//!
//! ```text
//! {"image": "/tmp/chunk.png", "task": "text"}
//! {"ok": true, "blocks": [{"bounds": {...}, "text": "..."}]}
//! {"image": "/tmp/chunk.png", "task": "faces"}
//! {"ok": true, "faces": [{"bounds": {...}, "smiling_probability": 0.4}]}
//! {"shutdown": true}
//! ```
//!
//! Calls block; the analysis pipeline runs them on the blocking pool.

use anyhow::{Context, Result};
use image::RgbaImage;
use narrator_core::error::RecognitionError;
use narrator_core::model::{FaceCandidate, TextBlock};
use narrator_core::services::{FaceDetector, TextRecognizer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum SidecarTask {
    Text,
    Faces,
}

#[derive(Serialize)]
struct SidecarRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<SidecarTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shutdown: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
struct SidecarResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    blocks: Vec<TextBlock>,
    #[serde(default)]
    faces: Vec<FaceCandidate>,
}

struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

pub struct SidecarClient {
    worker: Mutex<WorkerProcess>,
    scratch_dir: PathBuf,
}

impl SidecarClient {
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        info!(%command, ?args, "Starting OCR sidecar");
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to start OCR sidecar `{command}`"))?;
        let stdin = child
            .stdin
            .take()
            .context("OCR sidecar has no stdin pipe")?;
        let stdout = child
            .stdout
            .take()
            .context("OCR sidecar has no stdout pipe")?;
        let scratch_dir = std::env::temp_dir().join("manga-narrator");
        fs::create_dir_all(&scratch_dir)
            .with_context(|| format!("Failed to create {}", scratch_dir.display()))?;
        Ok(Self {
            worker: Mutex::new(WorkerProcess {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            }),
            scratch_dir,
        })
    }

    fn request(
        &self,
        image: &RgbaImage,
        task: SidecarTask,
    ) -> Result<SidecarResponse, RecognitionError> {
        let path = unique_temp_png(&self.scratch_dir);
        image
            .save(&path)
            .map_err(|err| RecognitionError::Engine(format!("writing chunk image: {err}")))?;
        let result = self.exchange(&path, task);
        if let Err(err) = fs::remove_file(&path) {
            debug!(path = %path.display(), "Failed to remove chunk image: {err}");
        }
        let response = result?;
        if !response.ok {
            return Err(RecognitionError::Engine(
                response
                    .error
                    .unwrap_or_else(|| "worker reported failure".to_string()),
            ));
        }
        Ok(response)
    }

    fn exchange(&self, image: &Path, task: SidecarTask) -> Result<SidecarResponse, RecognitionError> {
        let image = image.to_string_lossy();
        let request = SidecarRequest {
            image: Some(&image),
            task: Some(task),
            shutdown: None,
        };
        let payload = serde_json::to_string(&request)
            .map_err(|err| RecognitionError::Engine(format!("encoding request: {err}")))?;

        let mut worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let unavailable = |err: std::io::Error| RecognitionError::Unavailable(err.to_string());
        worker.stdin.write_all(payload.as_bytes()).map_err(unavailable)?;
        worker.stdin.write_all(b"\n").map_err(unavailable)?;
        worker.stdin.flush().map_err(unavailable)?;

        let mut line = String::new();
        let read = worker.stdout.read_line(&mut line).map_err(unavailable)?;
        if read == 0 {
            return Err(RecognitionError::Unavailable(
                "OCR sidecar closed its output".to_string(),
            ));
        }
        parse_response(&line)
    }
}

fn parse_response(line: &str) -> Result<SidecarResponse, RecognitionError> {
    serde_json::from_str(line.trim())
        .map_err(|err| RecognitionError::Engine(format!("invalid worker response: {err}")))
}

impl TextRecognizer for SidecarClient {
    fn recognize(&self, image: &RgbaImage) -> Result<Vec<TextBlock>, RecognitionError> {
        Ok(self.request(image, SidecarTask::Text)?.blocks)
    }
}

impl FaceDetector for SidecarClient {
    fn detect(&self, image: &RgbaImage) -> Result<Vec<FaceCandidate>, RecognitionError> {
        Ok(self.request(image, SidecarTask::Faces)?.faces)
    }
}

impl Drop for SidecarClient {
    fn drop(&mut self) {
        let worker = match self.worker.get_mut() {
            Ok(worker) => worker,
            Err(poisoned) => poisoned.into_inner(),
        };
        let shutdown = SidecarRequest {
            image: None,
            task: None,
            shutdown: Some(true),
        };
        if let Ok(payload) = serde_json::to_string(&shutdown) {
            let _ = writeln!(worker.stdin, "{payload}");
            let _ = worker.stdin.flush();
        }
        match worker.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(err) = worker.child.kill() {
                    debug!("OCR sidecar already gone: {err}");
                }
                let _ = worker.child.wait();
            }
        }
        if let Err(err) = fs::remove_dir(&self.scratch_dir) {
            debug!(path = %self.scratch_dir.display(), "Scratch dir kept: {err}");
        }
    }
}

fn unique_temp_png(dir: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let nonce = SEQ.fetch_add(1, Ordering::Relaxed);
    let ts_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    dir.join(format!("chunk-{}-{ts_nanos}-{nonce}.png", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrator_core::geometry::Rect;

    #[test]
    fn request_lines_match_the_worker_protocol() {
        let request = SidecarRequest {
            image: Some("/tmp/a.png"),
            task: Some(SidecarTask::Faces),
            shutdown: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"image":"/tmp/a.png","task":"faces"}"#
        );
    }

    #[test]
    fn responses_fill_missing_lists() {
        let response = parse_response(
            r#"{"ok":true,"blocks":[{"bounds":{"left":1,"top":2,"right":30,"bottom":12},"text":"Hi you"}]}"#,
        )
        .unwrap();
        assert!(response.ok);
        assert!(response.faces.is_empty());
        assert_eq!(response.blocks[0].bounds, Rect::new(1, 2, 30, 12));

        let failed = parse_response(r#"{"ok":false,"error":"model missing"}"#).unwrap();
        assert_eq!(failed.error.as_deref(), Some("model missing"));
        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn temp_names_are_unique() {
        let dir = Path::new("/tmp");
        assert_ne!(unique_temp_png(dir), unique_temp_png(dir));
    }
}
