mod input;
mod timing;

pub use input::{parse_script, InputError, Interaction};
use timing::{Debouncer, FrameTiming};

use crate::assets::{AssetError, SlotCache};
use crate::capture::{resolve_filename, CaptureError, CapturePipeline, CaptureSettings, CaptureTicket};
use crate::events::{Signal, SignalBus};
use crate::render::{
    clamp_focus, focus_index, CameraController, CameraHub, FrameInputs, FrameStats, RenderContext,
    RenderError, ViewportLayout,
};
use crate::scene::discovery::{discover_candidates, scan_available_files, DiscoveryError, FilePattern};
use crate::scene::Session;

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Quiet time before a candidate or pattern change triggers a directory rescan.
pub const RESCAN_DEBOUNCE: Duration = Duration::from_millis(1000);
/// Quiet time before a file or candidate selection change recomputes the model paths.
pub const PATHS_DEBOUNCE: Duration = Duration::from_millis(50);
/// Quiet time before a view slot starts loading its new path.
pub const SLOT_DEBOUNCE: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("failed to start capture writer: {0}")]
    Worker(#[source] std::io::Error),
}

/// Headless driver: owns the session, the per-view caches and the render surface, and
/// advances them one frame at a time.
pub struct App {
    session: Session,
    cache: SlotCache,
    hub: CameraHub,
    control: CameraController,
    render: RenderContext,
    bus: SignalBus,
    capture: CapturePipeline,
    timing: FrameTiming,
    rescan: Debouncer<()>,
    paths_dirty: Debouncer<()>,
    slot_loads: Vec<Debouncer<PathBuf>>,
    model_paths: Vec<PathBuf>,
    tickets: Vec<CaptureTicket>,
    completed: Vec<String>,
    failures: Vec<(String, CaptureError)>,
}

impl App {
    /// Fills in discovered candidates, the available file list and a default file when the
    /// session leaves them open, then schedules the first loads.
    pub fn new(mut session: Session) -> Result<Self, AppError> {
        let files = &mut session.files;
        if files.work_dir.as_os_str().is_empty() {
            files.work_dir = PathBuf::from(".");
        }
        if files.candidates.is_empty() {
            files.candidates = discover_candidates(&files.work_dir)?;
        }
        if files.selected_candidates.is_empty() {
            files.selected_candidates = files.candidates.clone();
        }
        let pattern = FilePattern::parse(&files.file_pattern);
        files.available_files =
            scan_available_files(&files.work_dir, &files.selected_candidates, &pattern);
        if files.selected_file.is_none() {
            files.selected_file = files.available_files.first().cloned();
        }
        log::info!(
            "Work directory {}: {} candidates, {} files, showing {}",
            files.work_dir.display(),
            files.selected_candidates.len(),
            files.available_files.len(),
            files.selected_file.as_deref().unwrap_or("nothing")
        );

        let bus = SignalBus::new();
        let capture = CapturePipeline::new(bus.sender()).map_err(AppError::Worker)?;
        let now = Instant::now();
        let mut app = Self {
            hub: CameraHub::new(session.camera),
            control: CameraController::from_state(&session.camera),
            session,
            cache: SlotCache::new(),
            render: RenderContext::new(),
            bus,
            capture,
            timing: FrameTiming::new(now),
            rescan: Debouncer::new(RESCAN_DEBOUNCE),
            paths_dirty: Debouncer::new(PATHS_DEBOUNCE),
            slot_loads: Vec::new(),
            model_paths: Vec::new(),
            tickets: Vec::new(),
            completed: Vec::new(),
            failures: Vec::new(),
        };
        app.refresh_model_paths(now);
        Ok(app)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn model_paths(&self) -> &[PathBuf] {
        &self.model_paths
    }

    pub fn cache(&self) -> &SlotCache {
        &self.cache
    }

    pub fn frames_rendered(&self) -> u64 {
        self.timing.frames_total()
    }

    /// Focus index as stored alongside the configuration: `-1` when no view exists.
    pub fn effective_focus(&self) -> i64 {
        focus_index(self.session.render.focused_candidate, self.model_paths.len())
    }

    /// Per-view load failures, in view order.
    pub fn view_errors(&self) -> impl Iterator<Item = (usize, &AssetError)> + '_ {
        (0..self.model_paths.len()).filter_map(move |index| Some((index, self.cache.error(index)?)))
    }

    pub fn select_file(&mut self, file: Option<String>, now: Instant) {
        self.session.files.selected_file = file;
        self.paths_dirty.push((), now);
    }

    pub fn select_candidates(&mut self, candidates: Vec<String>, now: Instant) {
        self.session.files.selected_candidates = candidates;
        self.paths_dirty.push((), now);
        self.rescan.push((), now);
    }

    pub fn set_file_pattern(&mut self, pattern: String, now: Instant) {
        self.session.files.file_pattern = pattern;
        self.rescan.push((), now);
    }

    pub fn set_focus(&mut self, requested: i64) {
        self.session.render.focused_candidate = requested;
    }

    pub fn apply_interaction(&mut self, interaction: Interaction) {
        log::debug!("Interaction: {:?}", interaction);
        input::apply(interaction, &mut self.control, &mut self.hub);
        self.session.camera = *self.hub.snapshot();
    }

    /// Raises `capture.requested` on the signal bus; it is served after the next render.
    pub fn request_capture(&self, filename: &str) {
        self.bus.publish(Signal::CaptureRequested {
            filename: filename.to_string(),
        });
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings::from_output(&self.session.output, &self.session.files.work_dir)
    }

    /// Output name for `source` under the configured template and format.
    pub fn output_name(&self, source: &str) -> String {
        let output = &self.session.output;
        resolve_filename(&output.filename_template, source, output.format)
    }

    fn refresh_model_paths(&mut self, now: Instant) {
        let paths = self.session.files.model_paths();
        self.cache.truncate(paths.len());
        self.slot_loads.truncate(paths.len());
        self.slot_loads
            .resize_with(paths.len(), || Debouncer::new(SLOT_DEBOUNCE));
        for (index, path) in paths.iter().enumerate() {
            let debounce = &mut self.slot_loads[index];
            if debounce.is_pending() || self.cache.path(index) != Some(path.as_path()) {
                debounce.push(path.clone(), now);
            }
        }
        log::debug!("Model paths: {:?}", paths);
        self.model_paths = paths;
    }

    fn rescan_files(&mut self) {
        let files = &mut self.session.files;
        let pattern = FilePattern::parse(&files.file_pattern);
        files.available_files =
            scan_available_files(&files.work_dir, &files.selected_candidates, &pattern);
        log::info!("{} model files available", files.available_files.len());
    }

    /// True while a debounced change or a load has not landed yet.
    pub fn is_busy(&self) -> bool {
        self.rescan.is_pending()
            || self.paths_dirty.is_pending()
            || self.slot_loads.iter().any(Debouncer::is_pending)
            || self.cache.pending_count() > 0
    }

    /// One frame: debounced config, cache completion, camera sync, render, then signals.
    pub fn frame(&mut self, now: Instant) -> Result<FrameStats, AppError> {
        self.timing.update(now);

        if self.rescan.poll(now).is_some() {
            self.rescan_files();
        }
        if self.paths_dirty.poll(now).is_some() {
            self.refresh_model_paths(now);
        }
        for (index, debounce) in self.slot_loads.iter_mut().enumerate() {
            if let Some(path) = debounce.poll(now) {
                self.cache.ensure(index, &path);
            }
        }
        self.cache.poll();

        self.control.sync(&mut self.hub);
        let camera = self.hub.snapshot();
        self.session.camera = *camera;

        let count = self.model_paths.len();
        let layout = ViewportLayout::new(&self.session.render, self.session.output.scale(), count);
        self.render
            .configure(layout, self.session.render.preview_size)?;

        let started = Instant::now();
        let stats = self.render.render_frame(
            &FrameInputs {
                camera: camera.as_ref(),
                lights: &self.session.lights,
                material: &self.session.material,
                transparent: self.session.output.transparent(),
                focus: clamp_focus(self.session.render.focused_candidate, count),
            },
            &self.cache,
        );
        self.timing
            .set_render_ms(started.elapsed().as_secs_f32() * 1000.0);

        self.handle_signals();
        self.poll_captures();
        Ok(stats)
    }

    /// Waits out the frame interval, then renders.
    pub fn step(&mut self) -> Result<FrameStats, AppError> {
        let wait = self.timing.remaining(Instant::now());
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        self.frame(Instant::now())
    }

    /// Steps until every debounced change and load has landed in the composite.
    pub fn settle(&mut self) -> Result<FrameStats, AppError> {
        loop {
            let stats = self.step()?;
            if !self.is_busy() {
                return Ok(stats);
            }
        }
    }

    fn handle_signals(&mut self) {
        for signal in self.bus.drain() {
            match signal {
                Signal::CaptureRequested { filename } => {
                    let settings = self.capture_settings();
                    let ticket = self
                        .capture
                        .submit(&filename, self.render.preview(), settings);
                    self.tickets.push(ticket);
                }
                Signal::CaptureCompleted { filename } => {
                    log::info!("Capture completed: {}", filename);
                    self.completed.push(filename);
                }
            }
        }
    }

    fn poll_captures(&mut self) {
        let mut index = 0;
        while index < self.tickets.len() {
            match self.tickets[index].try_result() {
                None => index += 1,
                Some(result) => {
                    let ticket = self.tickets.remove(index);
                    if let Err(err) = result {
                        self.failures.push((ticket.filename().to_string(), err));
                    }
                }
            }
        }
    }

    /// Failed captures requested through the signal bus since the last call.
    pub fn take_capture_failures(&mut self) -> Vec<(String, CaptureError)> {
        std::mem::take(&mut self.failures)
    }

    /// Requests a capture of the preview and steps until `capture.completed` arrives for it.
    pub fn export(&mut self, filename: &str) -> Result<PathBuf, AppError> {
        self.request_capture(filename);
        loop {
            self.step()?;
            if let Some(at) = self.completed.iter().position(|done| done == filename) {
                self.completed.remove(at);
                return Ok(self.capture_settings().destination.join(filename));
            }
            if let Some(at) = self.failures.iter().position(|(name, _)| name == filename) {
                let (_, err) = self.failures.remove(at);
                return Err(err.into());
            }
        }
    }

    /// Writes the focused view's crop through the same capture queue.
    pub fn export_focus(&self, filename: &str) -> CaptureTicket {
        self.capture
            .submit(filename, self.render.focus(), self.capture_settings())
    }

    /// Shows each file in turn and exports it, moving on only after its completion signal.
    pub fn export_batch(&mut self, files: &[String]) -> Result<Vec<PathBuf>, AppError> {
        let mut written = Vec::with_capacity(files.len());
        for (position, file) in files.iter().enumerate() {
            log::info!("Batch {}/{}: {}", position + 1, files.len(), file);
            self.select_file(Some(file.clone()), Instant::now());
            self.settle()?;
            let filename = self.output_name(file);
            written.push(self.export(&filename)?);
        }
        Ok(written)
    }

    /// Stops the capture writer after queued work and hands back the session.
    pub fn finish(mut self) -> Session {
        self.capture.shutdown();
        self.render.release();
        self.cache.clear();
        self.session.camera = *self.hub.snapshot();
        self.session
    }
}
