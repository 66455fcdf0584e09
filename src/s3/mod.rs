pub mod actions;
pub mod api;
pub mod checksum;
pub mod client;
pub mod credentials;
pub mod error;
pub mod limits;
pub mod region;
pub mod request;
pub mod responses;
pub mod signature;
pub mod tools;

pub use self::{
    api::S3Api, client::HttpClient, credentials::Credentials, error::ApiError, region::Region,
    signature::Signature,
};

use anyhow::{Context, Result};
use url::Url;

#[derive(Debug, Clone)]
pub struct S3 {
    // AWS Credentials
    credentials: Credentials,
    // AWS Region
    region: Region,
}

// Amazon S3 API Reference
// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_Operations.html>
impl S3 {
    #[must_use]
    pub fn new(credentials: &Credentials, region: &Region) -> Self {
        Self {
            credentials: credentials.clone(),
            region: region.clone(),
        }
    }

    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    #[must_use]
    pub const fn region(&self) -> &Region {
        &self.region
    }

    /// Base URL of the service, buckets are addressed path-style on top of it
    ///
    /// # Errors
    ///
    /// Will return `Err` if the region endpoint is not a valid URL
    pub fn endpoint(&self) -> Result<Url> {
        let endpoint = self.region.endpoint();
        let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint
        } else {
            format!("https://{endpoint}")
        };

        Url::parse(&endpoint).with_context(|| format!("invalid endpoint: {endpoint}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_endpoint() {
        let credentials = Credentials::new("access", &SecretString::from("secret"));
        let test = vec![
            (Region::UsWest2, "https://s3.us-west-2.amazonaws.com/"),
            (
                Region::Custom {
                    name: "local".to_string(),
                    endpoint: "http://127.0.0.1:9000".to_string(),
                },
                "http://127.0.0.1:9000/",
            ),
            (
                Region::Custom {
                    name: "wasabi".to_string(),
                    endpoint: "s3.wasabisys.com".to_string(),
                },
                "https://s3.wasabisys.com/",
            ),
        ];

        for (region, expected) in test {
            let s3 = S3::new(&credentials, &region);
            assert_eq!(s3.endpoint().unwrap().as_str(), expected);
        }
    }
}
