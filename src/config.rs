use crate::{
    client::Client,
    net::{
        RoundRobinDns,
        dns::{DEFAULT_CACHE_SIZE, DEFAULT_TTL},
    },
    options::Options,
    s3::{Credentials, HttpClient, Region, S3, request::Transport},
};
use anyhow::{Context, Result, ensure};
use secrecy::SecretString;
use serde::Deserialize;
use std::{
    collections::BTreeMap, env, fs::File, net::IpAddr, path::PathBuf, sync::Arc, time::Duration,
};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub hosts: BTreeMap<String, Host>,
    #[serde(default)]
    pub transfer: Options,
    #[serde(default)]
    pub network: Network,
}

#[derive(Debug, Deserialize, Eq, PartialEq)]
pub struct Host {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    pub bucket: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Network {
    /// Resolve through [`RoundRobinDns`] instead of the system resolver
    pub round_robin_dns: bool,
    /// seconds
    pub dns_ttl: u64,
    pub dns_cache_size: u32,
    /// Bind connections to these addresses in turn
    pub local_addresses: Vec<IpAddr>,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            round_robin_dns: false,
            dns_ttl: DEFAULT_TTL.as_secs(),
            dns_cache_size: DEFAULT_CACHE_SIZE,
            local_addresses: Vec::new(),
        }
    }
}

impl Network {
    /// # Errors
    ///
    /// Will return `Err` if round-robin DNS is enabled with a zero TTL
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.round_robin_dns || self.dns_ttl > 0,
            "invalid configuration: dns_ttl must be at least 1 second"
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Will return `Err` if the network settings are invalid or an HTTP
    /// client can't be built
    pub fn transport(&self) -> Result<Transport> {
        self.validate()?;
        let mut builder = Transport::builder().local_addresses(self.local_addresses.clone());
        if self.round_robin_dns {
            builder = builder.dns(RoundRobinDns::new(
                self.dns_cache_size.max(1),
                Duration::from_secs(self.dns_ttl),
            ));
        }
        builder.build()
    }
}

impl Config {
    /// # Errors
    ///
    /// Will return `Err` if the file can't be opened or parsed
    pub fn new(config_path: PathBuf) -> Result<Self> {
        let file = File::open(&config_path)
            .with_context(|| format!("unable to open {}", config_path.display()))?;

        let config: Self =
            serde_yaml_ng::from_reader(file).context("unable to parse config file")?;

        Ok(config)
    }

    /// Get the host from the config.yml
    ///
    /// # Errors
    ///
    /// Will return `Err` if the host is not defined
    pub fn get_host(&self, name: &str) -> Result<&Host> {
        self.hosts
            .get(name)
            .with_context(|| format!("could not find host {name}"))
    }

    /// A client talking to `host` with the `transfer` options
    ///
    /// # Errors
    ///
    /// Will return `Err` if the host is missing or incomplete, the transfer
    /// options are invalid or the HTTP client can't be built
    pub fn client(&self, host: &str) -> Result<Client> {
        let host = self.get_host(host)?;
        self.transfer.validate()?;

        let region = host.get_region()?;

        log::debug!(
            "Starting client:
        endpoint: {}
        options: {:?}
        network: {:?}",
            region.endpoint(),
            self.transfer,
            self.network,
        );

        let s3 = S3::new(&host.get_credentials(), &region);
        let api = HttpClient::with_transport(s3, self.network.transport()?);

        Ok(Client::new(Arc::new(api), self.transfer.clone()))
    }
}

impl Host {
    /// Get the region for the host, an endpoint makes it a custom region
    ///
    /// # Errors
    ///
    /// Will return `Err` if the region is unknown, or if neither the host nor
    /// `AWS_REGION` define one
    pub fn get_region(&self) -> Result<Region> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(Region::Custom {
                name: self.region.clone().unwrap_or_default(),
                endpoint: endpoint.to_string(),
            });
        }

        let region = match &self.region {
            Some(r) => r.clone(),
            None => env::var("AWS_REGION")
                .ok()
                .context("could not parse host need an endpoint or region")?,
        };

        Ok(region.parse::<Region>()?)
    }

    /// Keys of the host, empty ones are read from the environment
    #[must_use]
    pub fn get_credentials(&self) -> Credentials {
        Credentials::new(
            &self.access_key,
            &SecretString::from(self.secret_key.clone()),
        )
    }
}
