use mongodb::options::{
    Acknowledgment, ClientOptions, ReadPreference, SelectionCriteria, WriteConcern,
};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use ycsb::{ErrorKind, Properties, YcsbError, YcsbResult};

/// `|`-separated list of connection strings, one endpoint per entry.
pub const URL_PROPERTY: &str = "mongodb.url";
/// Database every collection lives in.
pub const DATABASE_PROPERTY: &str = "mongodb.database";
/// Number of inserts buffered per collection before one bulk insert.
pub const BATCH_SIZE_PROPERTY: &str = "batchsize";
/// How many times over the written payloads compress.
pub const COMPRESSIBILITY_PROPERTY: &str = "compressibility";
/// Driver pool size per host; the harness sets it to its thread count.
pub const MAX_CONNECTIONS_PROPERTY: &str = "threadcount";
/// Acknowledgment level, see [`WriteConcernLevel`].
pub const WRITE_CONCERN_PROPERTY: &str = "mongodb.writeConcern";
/// Replica selection, see [`ReadPreferenceMode`].
pub const READ_PREFERENCE_PROPERTY: &str = "mongodb.readPreference";

pub const DEFAULT_URL: &str = "localhost:27017";
pub const DEFAULT_DATABASE: &str = "ycsb";
pub const DEFAULT_BATCH_SIZE: usize = 1;
pub const DEFAULT_COMPRESSIBILITY: f64 = 1.0;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 100;

/// Write acknowledgment level requested for every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WriteConcernLevel {
    /// `w: 0`, fire and forget
    Unacknowledged,
    /// `w: 1`
    #[default]
    Acknowledged,
    /// `w: 1, j: true`
    Journaled,
    /// `w: 2`
    ReplicaAcknowledged,
    /// `w: "majority"`
    Majority,
}

impl WriteConcernLevel {
    /// Translates the level into the driver's write concern.
    pub fn to_write_concern(&self) -> WriteConcern {
        let mut concern = WriteConcern::default();
        match self {
            WriteConcernLevel::Unacknowledged => concern.w = Some(Acknowledgment::Nodes(0)),
            WriteConcernLevel::Acknowledged => concern.w = Some(Acknowledgment::Nodes(1)),
            WriteConcernLevel::Journaled => {
                concern.w = Some(Acknowledgment::Nodes(1));
                concern.journal = Some(true);
            }
            WriteConcernLevel::ReplicaAcknowledged => concern.w = Some(Acknowledgment::Nodes(2)),
            WriteConcernLevel::Majority => concern.w = Some(Acknowledgment::Majority),
        }
        concern
    }
}

impl FromStr for WriteConcernLevel {
    type Err = YcsbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unacknowledged" => Ok(WriteConcernLevel::Unacknowledged),
            "acknowledged" => Ok(WriteConcernLevel::Acknowledged),
            "journaled" => Ok(WriteConcernLevel::Journaled),
            "replica_acknowledged" => Ok(WriteConcernLevel::ReplicaAcknowledged),
            "majority" => Ok(WriteConcernLevel::Majority),
            other => Err(YcsbError::new(
                &format!(
                    "Invalid writeConcern: '{}'. Must be [ unacknowledged | acknowledged | journaled | replica_acknowledged | majority ]",
                    other
                ),
                ErrorKind::InvalidConfiguration,
            )),
        }
    }
}

impl Display for WriteConcernLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteConcernLevel::Unacknowledged => write!(f, "unacknowledged"),
            WriteConcernLevel::Acknowledged => write!(f, "acknowledged"),
            WriteConcernLevel::Journaled => write!(f, "journaled"),
            WriteConcernLevel::ReplicaAcknowledged => write!(f, "replica_acknowledged"),
            WriteConcernLevel::Majority => write!(f, "majority"),
        }
    }
}

/// Replica roles eligible to serve reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReadPreferenceMode {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl ReadPreferenceMode {
    /// Translates the mode into the driver's read preference, without tag
    /// sets or staleness bounds.
    pub fn to_read_preference(&self) -> ReadPreference {
        match self {
            ReadPreferenceMode::Primary => ReadPreference::Primary,
            ReadPreferenceMode::PrimaryPreferred => ReadPreference::PrimaryPreferred {
                options: Default::default(),
            },
            ReadPreferenceMode::Secondary => ReadPreference::Secondary {
                options: Default::default(),
            },
            ReadPreferenceMode::SecondaryPreferred => ReadPreference::SecondaryPreferred {
                options: Default::default(),
            },
            ReadPreferenceMode::Nearest => ReadPreference::Nearest {
                options: Default::default(),
            },
        }
    }
}

impl FromStr for ReadPreferenceMode {
    type Err = YcsbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Ok(ReadPreferenceMode::Primary),
            "primary_preferred" => Ok(ReadPreferenceMode::PrimaryPreferred),
            "secondary" => Ok(ReadPreferenceMode::Secondary),
            "secondary_preferred" => Ok(ReadPreferenceMode::SecondaryPreferred),
            "nearest" => Ok(ReadPreferenceMode::Nearest),
            other => Err(YcsbError::new(
                &format!(
                    "Invalid readPreference: '{}'. Must be [ primary | primary_preferred | secondary | secondary_preferred | nearest ]",
                    other
                ),
                ErrorKind::InvalidConfiguration,
            )),
        }
    }
}

impl Display for ReadPreferenceMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadPreferenceMode::Primary => write!(f, "primary"),
            ReadPreferenceMode::PrimaryPreferred => write!(f, "primary_preferred"),
            ReadPreferenceMode::Secondary => write!(f, "secondary"),
            ReadPreferenceMode::SecondaryPreferred => write!(f, "secondary_preferred"),
            ReadPreferenceMode::Nearest => write!(f, "nearest"),
        }
    }
}

/// MongoDB binding configuration.
///
/// An immutable, cheaply cloneable holder for every option the binding reads.
/// Clones share one `Arc<MongoConfigInner>`, so the configuration built by the
/// first `init` can be handed to every worker without copying.
///
/// Built either from harness [`Properties`] with
/// [`MongoConfig::from_properties`] or programmatically with
/// [`MongoConfig::builder`]. Both paths validate the values.
#[derive(Clone, Debug)]
pub struct MongoConfig {
    inner: Arc<MongoConfigInner>,
}

impl MongoConfig {
    /// Creates a builder preloaded with the defaults.
    #[inline]
    pub fn builder() -> MongoConfigBuilder {
        MongoConfigBuilder::new()
    }

    /// Reads the binding's options from harness properties.
    ///
    /// Missing keys take their defaults. An unrecognized write concern or
    /// read preference, an unparsable number, or a `mongodb.url` that names
    /// no endpoint fails with [`ErrorKind::InvalidConfiguration`].
    pub fn from_properties(props: &Properties) -> YcsbResult<MongoConfig> {
        let urls = split_urls(props.get_or(URL_PROPERTY, DEFAULT_URL));
        if urls.is_empty() {
            return Err(invalid(format!(
                "{} names no endpoint: '{}'",
                URL_PROPERTY,
                props.get_or(URL_PROPERTY, "")
            )));
        }
        let write_concern: WriteConcernLevel = props
            .get_or(WRITE_CONCERN_PROPERTY, "acknowledged")
            .parse()?;
        let read_preference: ReadPreferenceMode = props
            .get_or(READ_PREFERENCE_PROPERTY, "primary")
            .parse()?;

        MongoConfig::builder()
            .urls(urls)
            .database(props.get_or(DATABASE_PROPERTY, DEFAULT_DATABASE))
            .batch_size(props.parse_or(BATCH_SIZE_PROPERTY, DEFAULT_BATCH_SIZE)?)
            .compressibility(props.parse_or(COMPRESSIBILITY_PROPERTY, DEFAULT_COMPRESSIBILITY)?)
            .max_connections(props.parse_or(MAX_CONNECTIONS_PROPERTY, DEFAULT_MAX_CONNECTIONS)?)
            .write_concern(write_concern)
            .read_preference(read_preference)
            .build()
    }

    #[inline]
    pub fn urls(&self) -> &[String] {
        &self.inner.urls
    }

    #[inline]
    pub fn database(&self) -> &str {
        &self.inner.database
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.inner.batch_size
    }

    #[inline]
    pub fn compressibility(&self) -> f64 {
        self.inner.compressibility
    }

    #[inline]
    pub fn max_connections(&self) -> u32 {
        self.inner.max_connections
    }

    #[inline]
    pub fn write_concern(&self) -> WriteConcernLevel {
        self.inner.write_concern
    }

    #[inline]
    pub fn read_preference(&self) -> ReadPreferenceMode {
        self.inner.read_preference
    }

    /// Fills driver options the connection string left unset.
    ///
    /// Options given in a `mongodb://` URI take precedence over the
    /// configured pool size, write concern and read preference.
    pub(crate) fn apply_to(&self, options: &mut ClientOptions) {
        options.max_pool_size.get_or_insert(self.max_connections());
        options
            .write_concern
            .get_or_insert_with(|| self.write_concern().to_write_concern());
        options.selection_criteria.get_or_insert_with(|| {
            SelectionCriteria::ReadPreference(self.read_preference().to_read_preference())
        });
    }
}

#[derive(Debug)]
struct MongoConfigInner {
    urls: Vec<String>,
    database: String,
    batch_size: usize,
    compressibility: f64,
    max_connections: u32,
    write_concern: WriteConcernLevel,
    read_preference: ReadPreferenceMode,
}

/// Fluent builder for [`MongoConfig`].
///
/// ```rust,ignore
/// let config = MongoConfig::builder()
///     .url("mongodb://db1:27017")
///     .url("db2:27017")
///     .write_concern(WriteConcernLevel::Majority)
///     .batch_size(100)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct MongoConfigBuilder {
    urls: Vec<String>,
    database: String,
    batch_size: usize,
    compressibility: f64,
    max_connections: u32,
    write_concern: WriteConcernLevel,
    read_preference: ReadPreferenceMode,
}

impl MongoConfigBuilder {
    pub fn new() -> MongoConfigBuilder {
        MongoConfigBuilder {
            urls: Vec::new(),
            database: DEFAULT_DATABASE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            compressibility: DEFAULT_COMPRESSIBILITY,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            write_concern: WriteConcernLevel::default(),
            read_preference: ReadPreferenceMode::default(),
        }
    }

    /// Appends one endpoint connection string.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    /// Replaces the endpoint list.
    pub fn urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn compressibility(mut self, compressibility: f64) -> Self {
        self.compressibility = compressibility;
        self
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn write_concern(mut self, write_concern: WriteConcernLevel) -> Self {
        self.write_concern = write_concern;
        self
    }

    pub fn read_preference(mut self, read_preference: ReadPreferenceMode) -> Self {
        self.read_preference = read_preference;
        self
    }

    /// Validates the options and freezes them into a [`MongoConfig`].
    ///
    /// Without any explicit endpoint the default `localhost:27017` is used.
    pub fn build(self) -> YcsbResult<MongoConfig> {
        let urls = if self.urls.is_empty() {
            vec![DEFAULT_URL.to_string()]
        } else {
            self.urls
        };
        if urls.iter().any(|url| url.trim().is_empty()) {
            return Err(invalid(format!("Empty connection string in {}", URL_PROPERTY)));
        }
        if self.database.trim().is_empty() {
            return Err(invalid(format!("{} must not be empty", DATABASE_PROPERTY)));
        }
        if self.batch_size == 0 {
            return Err(invalid(format!("{} must be at least 1", BATCH_SIZE_PROPERTY)));
        }
        if !self.compressibility.is_finite() || self.compressibility <= 0.0 {
            return Err(invalid(format!(
                "{} must be a positive number, got {}",
                COMPRESSIBILITY_PROPERTY, self.compressibility
            )));
        }
        if self.max_connections == 0 {
            return Err(invalid(format!("{} must be at least 1", MAX_CONNECTIONS_PROPERTY)));
        }

        Ok(MongoConfig {
            inner: Arc::new(MongoConfigInner {
                urls,
                database: self.database,
                batch_size: self.batch_size,
                compressibility: self.compressibility,
                max_connections: self.max_connections,
                write_concern: self.write_concern,
                read_preference: self.read_preference,
            }),
        })
    }
}

impl Default for MongoConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(message: String) -> YcsbError {
    YcsbError::new(&message, ErrorKind::InvalidConfiguration)
}

/// Splits a `|`-separated endpoint list, dropping blank entries.
pub fn split_urls(urls: &str) -> Vec<String> {
    urls.split('|')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}
