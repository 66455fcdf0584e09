//! Transfer facade over an [`S3Api`]
//!
//! ```no_run
//! # async fn run(client: s3tm::Client) -> anyhow::Result<()> {
//! use s3tm::{GetObjectInput, PutObjectInput, UploadBody};
//!
//! let body = UploadBody::from_file("backup.tar").await?;
//! client
//!     .put_object(PutObjectInput::new("bucket", "backup.tar", body))
//!     .await?;
//!
//! let output = client
//!     .get_object_with(GetObjectInput::new("bucket", "backup.tar"), |options| {
//!         options.concurrency = 10;
//!     })
//!     .await?;
//! let bytes = output.body.collect().await?;
//! # Ok(())
//! # }
//! ```

use crate::{
    error::TransferError,
    options::Options,
    s3::S3Api,
    stream::{
        download::Downloader,
        get_object::{GetObjectInput, GetObjectOutput},
        put_object::{PutObjectInput, PutObjectOutput},
        upload::Uploader,
    },
};
use std::{fmt, sync::Arc};

#[derive(Clone)]
pub struct Client {
    api: Arc<dyn S3Api>,
    options: Options,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Client {
    #[must_use]
    pub fn new(api: Arc<dyn S3Api>, options: Options) -> Self {
        Self { api, options }
    }

    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    #[must_use]
    pub fn api(&self) -> Arc<dyn S3Api> {
        self.api.clone()
    }

    /// Upload `input`, in one `PutObject` or in parts
    ///
    /// # Errors
    ///
    /// Will return `Err` if the body can't be read or a request fails, a
    /// started multipart upload is aborted first
    pub async fn put_object(&self, input: PutObjectInput) -> Result<PutObjectOutput, TransferError> {
        self.put_object_with(input, |_| {}).await
    }

    /// Like [`Client::put_object`], `configure` adjusts a copy of the options
    /// for this call only
    ///
    /// # Errors
    ///
    /// Same as [`Client::put_object`]
    pub async fn put_object_with<F>(
        &self,
        input: PutObjectInput,
        configure: F,
    ) -> Result<PutObjectOutput, TransferError>
    where
        F: FnOnce(&mut Options),
    {
        let mut options = self.options.clone();
        configure(&mut options);
        Uploader::new(self.api.clone(), options).upload(input).await
    }

    /// Start downloading `input`, the returned body yields the bytes in order
    ///
    /// # Errors
    ///
    /// Will return `Err` if the download can't be planned, read errors are
    /// returned by the body
    pub async fn get_object(&self, input: GetObjectInput) -> Result<GetObjectOutput, TransferError> {
        self.get_object_with(input, |_| {}).await
    }

    /// Like [`Client::get_object`] with options adjusted for this call only
    ///
    /// # Errors
    ///
    /// Same as [`Client::get_object`]
    pub async fn get_object_with<F>(
        &self,
        input: GetObjectInput,
        configure: F,
    ) -> Result<GetObjectOutput, TransferError>
    where
        F: FnOnce(&mut Options),
    {
        let mut options = self.options.clone();
        configure(&mut options);
        Downloader::new(self.api.clone(), options)
            .download(input)
            .await
    }
}
