//! Parallel multipart uploads and concurrent ranged downloads for S3
//! compatible stores.
//!
//! [`Client::put_object`] reads the body into pooled part buffers and
//! uploads them with a fixed number of workers, falling back to a single
//! `PutObject` for small bodies. [`Client::get_object`] plans a download
//! with a `HeadObject`, fetches parts or ranges concurrently and hands them
//! back in order through an [`ObjectBody`].

pub mod client;
pub mod config;
pub mod error;
pub mod net;
pub mod options;
pub mod progress;
pub mod s3;
pub mod stream;

pub use self::{
    client::Client,
    config::Config,
    error::{S3Operation, TransferError},
    options::{GetObjectMode, Options},
    progress::{ProgressBarListener, ProgressListener, TransferKind, TransferRequest, TransferResult},
    stream::{
        body::{ObjectBody, UploadBody},
        get_object::{GetObjectInput, GetObjectOutput},
        put_object::{PutObjectInput, PutObjectOutput},
    },
};
