//! Encodes composite snapshots and writes them to disk on a single FIFO worker.

use crate::events::Signal;
use crate::scene::{ImageFormat, OutputConfig};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("nothing to capture: the composite is not available")]
    NothingToCapture,
    #[error("failed to encode {filename}: {source}")]
    Encode {
        filename: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("capture worker is not running")]
    WorkerGone,
}

/// Encoding and placement settings resolved from the output section at request time.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub format: ImageFormat,
    pub quality: u8,
    pub transparent: bool,
    pub destination: PathBuf,
}

impl CaptureSettings {
    pub fn from_output(output: &OutputConfig, work_dir: &Path) -> Self {
        Self {
            format: output.format,
            quality: output.clamped_quality(),
            transparent: output.transparent(),
            destination: output.destination(work_dir).to_path_buf(),
        }
    }
}

/// Expands `%name` (source file name without its last extension) and `%ext` (format
/// extension). Each occurrence is replaced; substituted text is not rescanned.
pub fn resolve_filename(template: &str, source: &str, format: ImageFormat) -> String {
    let name = Path::new(source)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(source);
    let mut out = String::with_capacity(template.len() + name.len());
    let mut rest = template;
    while let Some(at) = rest.find('%') {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        if let Some(after) = tail.strip_prefix("%name") {
            out.push_str(name);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("%ext") {
            out.push_str(format.extension());
            rest = after;
        } else {
            out.push('%');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

pub fn encode(image: &RgbaImage, settings: &CaptureSettings) -> Result<Vec<u8>, image::ImageError> {
    let (width, height) = image.dimensions();
    let mut bytes = Vec::new();
    match settings.format {
        ImageFormat::Jpg => {
            let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, settings.quality).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
        ImageFormat::Png if settings.transparent => {
            PngEncoder::new(&mut bytes).write_image(
                image.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            )?;
        }
        ImageFormat::Png => {
            let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            PngEncoder::new(&mut bytes).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
    }
    Ok(bytes)
}

/// Writes `<path>.partial` then renames it over `path`; the temporary is removed on failure.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), CaptureError> {
    let write_err = |source| CaptureError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
    }
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let result = std::fs::write(&partial, bytes).and_then(|_| std::fs::rename(&partial, path));
    if let Err(source) = result {
        let _ = std::fs::remove_file(&partial);
        return Err(write_err(source));
    }
    Ok(())
}

struct CaptureJob {
    filename: String,
    image: RgbaImage,
    settings: CaptureSettings,
    reply: flume::Sender<Result<PathBuf, CaptureError>>,
}

/// Completion handle for one capture request.
#[derive(Debug)]
pub struct CaptureTicket {
    filename: String,
    receiver: flume::Receiver<Result<PathBuf, CaptureError>>,
}

impl CaptureTicket {
    fn resolved(filename: String, result: Result<PathBuf, CaptureError>) -> Self {
        let (reply, receiver) = flume::bounded(1);
        let _ = reply.send(result);
        Self { filename, receiver }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Non-blocking; `None` while the worker is still busy with it.
    pub fn try_result(&self) -> Option<Result<PathBuf, CaptureError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(flume::TryRecvError::Empty) => None,
            Err(flume::TryRecvError::Disconnected) => Some(Err(CaptureError::WorkerGone)),
        }
    }

    pub fn wait(self) -> Result<PathBuf, CaptureError> {
        self.receiver
            .recv()
            .unwrap_or(Err(CaptureError::WorkerGone))
    }
}

/// Single background writer. Requests are handled strictly in submission order.
pub struct CapturePipeline {
    jobs: Option<flume::Sender<CaptureJob>>,
    worker: Option<JoinHandle<()>>,
}

impl CapturePipeline {
    /// `completions` receives `capture.completed` for every successful write.
    pub fn new(completions: flume::Sender<Signal>) -> std::io::Result<Self> {
        let (jobs, queue) = flume::unbounded::<CaptureJob>();
        let worker = std::thread::Builder::new()
            .name("capture-writer".to_string())
            .spawn(move || {
                for job in queue.iter() {
                    let result = run_job(&job);
                    match &result {
                        Ok(path) => {
                            log::info!("Capture written: {}", path.display());
                            let _ = completions.send(Signal::CaptureCompleted {
                                filename: job.filename.clone(),
                            });
                        }
                        Err(err) => log::error!("Capture {} failed: {}", job.filename, err),
                    }
                    let _ = job.reply.send(result);
                }
                log::debug!("Capture writer stopped");
            })?;
        Ok(Self {
            jobs: Some(jobs),
            worker: Some(worker),
        })
    }

    /// Snapshots `image` and queues it. A missing image resolves the ticket with
    /// [`CaptureError::NothingToCapture`].
    pub fn submit(
        &self,
        filename: &str,
        image: Option<&RgbaImage>,
        settings: CaptureSettings,
    ) -> CaptureTicket {
        let Some(image) = image else {
            return CaptureTicket::resolved(filename.to_string(), Err(CaptureError::NothingToCapture));
        };
        let Some(jobs) = self.jobs.as_ref() else {
            return CaptureTicket::resolved(filename.to_string(), Err(CaptureError::WorkerGone));
        };
        let (reply, receiver) = flume::bounded(1);
        let job = CaptureJob {
            filename: filename.to_string(),
            image: image.clone(),
            settings,
            reply,
        };
        if jobs.send(job).is_err() {
            return CaptureTicket::resolved(filename.to_string(), Err(CaptureError::WorkerGone));
        }
        CaptureTicket {
            filename: filename.to_string(),
            receiver,
        }
    }

    /// Finishes queued work and joins the worker.
    pub fn shutdown(&mut self) {
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Capture writer panicked");
            }
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(job: &CaptureJob) -> Result<PathBuf, CaptureError> {
    let bytes = encode(&job.image, &job.settings).map_err(|source| CaptureError::Encode {
        filename: job.filename.clone(),
        source,
    })?;
    let path = job.settings.destination.join(&job.filename);
    write_atomically(&path, &bytes)?;
    Ok(path)
}
