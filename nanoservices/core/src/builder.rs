use std::sync::Arc;
use std::time::Duration;

use crate::config::loader::ConfigError;
use crate::config::types::SyncConfig;
use crate::destinations::bigquery::{BigQueryDestination, ServiceAccountTokens};
use crate::destinations::traits::Destination;
use crate::pipeline::SyncPipeline;
use crate::sources::content_repo::ContentRepoClient;
use crate::sources::rapidpro::RapidProClient;
use crate::sources::traits::Source;
use crate::sources::{ContactsSource, FlowsSource, GroupsSource, PageViewsSource};
use crate::tables::Catalog;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("at least one source is required")]
    NoSource,
    #[error("a destination is required")]
    NoDestination,
    #[error("source {extractor} produces {table}, which has no schema")]
    UnknownTable { extractor: String, table: String },
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("warehouse.project is not set and the service-account key names no project")]
    NoProject,
    #[error("warehouse setup failed: {0}")]
    Warehouse(#[from] rapidflow_utils::error::Error),
}

/// BigQuery destination authenticated with the configured service-account key.
pub fn bigquery_from_config(config: &SyncConfig) -> Result<BigQueryDestination, BuildError> {
    let warehouse = &config.warehouse;
    let tokens = ServiceAccountTokens::from_file(&warehouse.key_path)?;
    let project = warehouse
        .project
        .clone()
        .or_else(|| tokens.project_id())
        .ok_or(BuildError::NoProject)?;

    Ok(BigQueryDestination::new(Arc::new(tokens), project, &warehouse.dataset)
        .location(warehouse.location.clone())
        .api_base(&warehouse.api_base)
        .max_bad_records(warehouse.max_bad_records)
        .poll_interval(config.poll_interval()?)
        .job_timeout(config.job_timeout()?))
}

/// RapidPro client carrying the configured retry policy.
pub fn rapidpro_from_config(config: &SyncConfig) -> Result<RapidProClient, BuildError> {
    Ok(RapidProClient::new(&config.rapidpro.url, &config.rapidpro.token)
        .with_retries(config.rapidpro.max_retries, config.max_retry_wait()?))
}

pub struct PipelineBuilder {
    sources: Vec<Arc<dyn Source>>,
    destination: Option<Arc<dyn Destination>>,
    catalog: Catalog,
    watermark_offset: Duration,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            destination: None,
            catalog: Catalog::default(),
            watermark_offset: Duration::from_secs(2 * 3600),
        }
    }

    /// Sources run in the order they are added.
    pub fn source(mut self, source: impl Source + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    pub fn destination(mut self, destination: impl Destination + 'static) -> Self {
        self.destination = Some(Arc::new(destination));
        self
    }

    pub fn shared_destination(mut self, destination: Arc<dyn Destination>) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn watermark_offset(mut self, offset: Duration) -> Self {
        self.watermark_offset = offset;
        self
    }

    /// Wire the standard RapidPro and content-repo extractors from config.
    pub fn from_config(config: &SyncConfig) -> Result<Self, BuildError> {
        let rapidpro = rapidpro_from_config(config)?;
        let content = ContentRepoClient::new(&config.content_repo.url, &config.content_repo.token);
        let fields = config.contact_fields.iter().map(|f| f.name.clone());

        Ok(Self::new()
            .catalog(Catalog::new(&config.contact_fields))
            .watermark_offset(config.watermark_offset()?)
            .source(PageViewsSource::new(content))
            .source(FlowsSource::new(rapidpro.clone()))
            .source(GroupsSource::new(rapidpro.clone()))
            .source(ContactsSource::new(rapidpro, fields)))
    }

    pub fn build(self) -> Result<SyncPipeline, BuildError> {
        if self.sources.is_empty() {
            return Err(BuildError::NoSource);
        }
        let destination = self.destination.ok_or(BuildError::NoDestination)?;

        for source in &self.sources {
            for table in source.produces() {
                if self.catalog.get(table).is_none() {
                    return Err(BuildError::UnknownTable {
                        extractor: source.name().to_string(),
                        table: table.to_string(),
                    });
                }
            }
        }

        Ok(SyncPipeline {
            sources: self.sources,
            destination,
            catalog: self.catalog,
            watermark_offset: self.watermark_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destinations::file::FileDestination;
    use crate::sources::traits::TableBatch;
    use crate::watermark::Watermarks;
    use rapidflow_utils::{RowBatch, SyncResult};

    struct FakeSource(&'static str);

    #[async_trait::async_trait]
    impl Source for FakeSource {
        fn name(&self) -> &str { "fake" }
        fn produces(&self) -> Vec<&str> { vec![self.0] }
        async fn extract(&self, _: &Watermarks) -> SyncResult<Vec<TableBatch>> {
            Ok(vec![TableBatch::new(self.0, RowBatch::default())])
        }
    }

    #[test]
    fn builder_creates_pipeline() {
        let pipeline = PipelineBuilder::new()
            .source(FakeSource("groups"))
            .destination(FileDestination("out".into()))
            .build()
            .unwrap();
        assert_eq!(pipeline.sources.len(), 1);
        assert_eq!(pipeline.watermark_offset, Duration::from_secs(7200));
    }

    #[test]
    fn builder_requires_source() {
        let result = PipelineBuilder::new()
            .destination(FileDestination("out".into()))
            .build();
        assert!(matches!(result, Err(BuildError::NoSource)));
    }

    #[test]
    fn builder_requires_destination() {
        let result = PipelineBuilder::new().source(FakeSource("groups")).build();
        assert!(matches!(result, Err(BuildError::NoDestination)));
    }

    #[test]
    fn builder_rejects_tables_without_schema() {
        let result = PipelineBuilder::new()
            .source(FakeSource("messages"))
            .destination(FileDestination("out".into()))
            .build();
        assert!(matches!(result, Err(BuildError::UnknownTable { table, .. }) if table == "messages"));
    }

    #[test]
    fn from_config_registers_sources_in_extraction_order() {
        let yaml = r#"
rapidpro:
  url: "https://rapidpro.example.org/"
content_repo:
  url: "https://content.example.org/api/v2/custom/pageviews/"
warehouse:
  dataset: rapidpro
watermark_offset: 90m
contact_fields:
  - name: age
    type: INTEGER
"#;
        let config = crate::config::parse_config(yaml).unwrap();
        let pipeline = PipelineBuilder::from_config(&config)
            .unwrap()
            .destination(FileDestination("out".into()))
            .build()
            .unwrap();

        let names: Vec<&str> = pipeline.sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["page_views", "flows", "groups", "contacts"]);
        assert_eq!(pipeline.watermark_offset, Duration::from_secs(5400));
        let contacts = pipeline.catalog().get("contacts_raw").unwrap();
        assert_eq!(contacts.columns.last().unwrap().name, "age");
    }

    #[test]
    fn rapidpro_client_takes_retry_policy_from_config() {
        let yaml = r#"
rapidpro:
  url: "https://rapidpro.example.org/"
  max_retries: 2
  max_retry_wait: 250ms
content_repo:
  url: "https://content.example.org/api/v2/custom/pageviews/"
warehouse:
  dataset: rapidpro
"#;
        let config = crate::config::parse_config(yaml).unwrap();
        let client = rapidpro_from_config(&config).unwrap();
        assert_eq!(client.retry_policy(), (2, Duration::from_millis(250)));

        let mut config = config;
        config.rapidpro.max_retry_wait = "later".to_string();
        assert!(matches!(rapidpro_from_config(&config), Err(BuildError::Config(_))));
    }

    #[test]
    fn bigquery_from_config_needs_a_readable_key() {
        let yaml = r#"
rapidpro:
  url: "https://rapidpro.example.org/"
content_repo:
  url: "https://content.example.org/api/v2/custom/pageviews/"
warehouse:
  dataset: rapidpro
  key_path: /nonexistent/credentials.json
"#;
        let config = crate::config::parse_config(yaml).unwrap();
        let result = bigquery_from_config(&config);
        assert!(matches!(result, Err(BuildError::Warehouse(_))));
    }
}
