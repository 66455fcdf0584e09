//! Progress events of a single object transfer
//!
//! Every operation emits one `on_start`, at least one `on_bytes_transferred`
//! and exactly one of `on_complete` or `on_failed`. Listeners run
//! synchronously on the transfer's task.

use crate::{error::TransferError, s3::api::ObjectMetadata, stream::put_object::PutObjectOutput};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::{fmt, sync::Arc};

// "█▉▊▋▌▍▎▏  ·"
const PROGRESS_CHARS: &str =
    "\u{2588}\u{2589}\u{258a}\u{258b}\u{258c}\u{258d}\u{258e}\u{258f}  \u{b7}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Upload,
    Download,
}

/// The object a transfer operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub kind: TransferKind,
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
    pub range: Option<String>,
}

impl TransferRequest {
    #[must_use]
    pub fn upload(bucket: &str, key: &str) -> Self {
        Self {
            kind: TransferKind::Upload,
            bucket: bucket.to_string(),
            key: key.to_string(),
            version_id: None,
            range: None,
        }
    }

    #[must_use]
    pub fn download(bucket: &str, key: &str) -> Self {
        Self {
            kind: TransferKind::Download,
            ..Self::upload(bucket, key)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TransferResult<'a> {
    Upload(&'a PutObjectOutput),
    Download(&'a ObjectMetadata),
}

/// Receives the lifecycle events of a transfer, `total_bytes` is `None` when
/// the size of an upload body is unknown
#[allow(unused_variables)]
pub trait ProgressListener: Send + Sync {
    fn on_start(&self, request: &TransferRequest, total_bytes: Option<u64>) {}

    fn on_bytes_transferred(
        &self,
        request: &TransferRequest,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
    ) {
    }

    fn on_complete(
        &self,
        request: &TransferRequest,
        result: TransferResult<'_>,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
    ) {
    }

    fn on_failed(
        &self,
        request: &TransferRequest,
        error: &TransferError,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
    ) {
    }
}

#[derive(Debug, Default)]
struct State {
    started: bool,
    finished: bool,
    reported: bool,
    transferred: u64,
    total: Option<u64>,
}

/// Fans the events of one operation out to its listeners
///
/// The state lock is held while listeners run so cumulative byte counts reach
/// every listener in order.
pub struct ProgressEmitter {
    request: TransferRequest,
    listeners: Vec<Arc<dyn ProgressListener>>,
    state: Mutex<State>,
}

impl fmt::Debug for ProgressEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressEmitter")
            .field("request", &self.request)
            .field("listeners", &self.listeners.len())
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl ProgressEmitter {
    #[must_use]
    pub fn new(request: TransferRequest, listeners: Vec<Arc<dyn ProgressListener>>) -> Self {
        Self {
            request,
            listeners,
            state: Mutex::new(State::default()),
        }
    }

    #[must_use]
    pub const fn request(&self) -> &TransferRequest {
        &self.request
    }

    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.state.lock().transferred
    }

    pub fn start(&self, total_bytes: Option<u64>) {
        let mut state = self.state.lock();
        if state.started {
            return;
        }
        state.started = true;
        state.total = total_bytes;

        for listener in &self.listeners {
            listener.on_start(&self.request, total_bytes);
        }
    }

    /// Add `bytes` to the cumulative count and notify listeners
    pub fn add(&self, bytes: u64) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        state.transferred = state.transferred.saturating_add(bytes);
        self.report(&mut state);
    }

    pub fn complete(&self, result: TransferResult<'_>) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        if !state.reported {
            self.report(&mut state);
        }
        state.finished = true;

        for listener in &self.listeners {
            listener.on_complete(&self.request, result, state.transferred, state.total);
        }
    }

    pub fn failed(&self, error: &TransferError) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        state.finished = true;

        for listener in &self.listeners {
            listener.on_failed(&self.request, error, state.transferred, state.total);
        }
    }

    fn report(&self, state: &mut State) {
        state.reported = true;
        for listener in &self.listeners {
            listener.on_bytes_transferred(&self.request, state.transferred, state.total);
        }
    }
}

/// Renders a transfer on the terminal
#[derive(Debug)]
pub struct ProgressBarListener {
    progress: ProgressBar,
}

impl Default for ProgressBarListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBarListener {
    #[must_use]
    pub fn new() -> Self {
        let pb = ProgressBar::new(0);

        match ProgressStyle::default_bar().template(
            "[{elapsed_precise}] {bar:50.green/blue} {bytes}/{total_bytes} ({bytes_per_sec} - {eta})",
        ) {
            Ok(style) => pb.set_style(style.progress_chars(PROGRESS_CHARS)),
            Err(err) => log::warn!("Error creating progress bar style: {err}"),
        }

        Self { progress: pb }
    }

    #[must_use]
    pub fn hidden() -> Self {
        Self {
            progress: ProgressBar::hidden(),
        }
    }

    #[must_use]
    pub const fn progress(&self) -> &ProgressBar {
        &self.progress
    }
}

impl ProgressListener for ProgressBarListener {
    fn on_start(&self, _request: &TransferRequest, total_bytes: Option<u64>) {
        if let Some(total) = total_bytes {
            self.progress.set_length(total);
        }
    }

    fn on_bytes_transferred(
        &self,
        _request: &TransferRequest,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
    ) {
        if total_bytes.is_none() {
            self.progress.set_length(bytes_transferred);
        }
        self.progress.set_position(bytes_transferred);
    }

    fn on_complete(
        &self,
        _request: &TransferRequest,
        _result: TransferResult<'_>,
        _bytes_transferred: u64,
        _total_bytes: Option<u64>,
    ) {
        self.progress.finish();
    }

    fn on_failed(
        &self,
        _request: &TransferRequest,
        _error: &TransferError,
        _bytes_transferred: u64,
        _total_bytes: Option<u64>,
    ) {
        self.progress.abandon();
    }
}
