//! One extractor per source entity.

use std::collections::HashSet;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use rapidflow_utils::{Row, SyncResult};

use crate::tables::{CONTACTS, FLOWS, FLOW_RUNS, FLOW_RUN_VALUES, GROUPS, GROUP_CONTACTS, PAGE_VIEWS};
use crate::transforms::flatten;
use crate::watermark::Watermarks;

use super::content_repo::ContentRepoClient;
use super::rapidpro::{RapidProClient, Run};
use super::traits::{Source, TableBatch};

pub struct GroupsSource {
    client: RapidProClient,
}

impl GroupsSource {
    pub fn new(client: RapidProClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Source for GroupsSource {
    fn name(&self) -> &str { "groups" }

    fn produces(&self) -> Vec<&str> { vec![GROUPS] }

    async fn extract(&self, _: &Watermarks) -> SyncResult<Vec<TableBatch>> {
        let groups = self.client.groups().await?;
        let rows: Vec<Row> = groups.iter().map(flatten::group_row).collect();
        Ok(vec![TableBatch::new(GROUPS, rows)])
    }
}

/// Contacts and their group memberships.
pub struct ContactsSource {
    client: RapidProClient,
    fields: HashSet<String>,
}

impl ContactsSource {
    pub fn new(client: RapidProClient, fields: impl IntoIterator<Item = String>) -> Self {
        Self { client, fields: fields.into_iter().collect() }
    }
}

#[async_trait]
impl Source for ContactsSource {
    fn name(&self) -> &str { "contacts" }

    fn produces(&self) -> Vec<&str> { vec![CONTACTS, GROUP_CONTACTS] }

    async fn extract(&self, watermarks: &Watermarks) -> SyncResult<Vec<TableBatch>> {
        let after = watermarks.after(CONTACTS);
        let contacts = self.client.contacts(after.as_deref()).await?;

        let mut rows = Vec::with_capacity(contacts.len());
        let mut memberships: Vec<Row> = Vec::new();
        for contact in &contacts {
            memberships.extend(flatten::group_contact_rows(contact));
            rows.push(flatten::contact_row(contact, &self.fields));
        }

        Ok(vec![
            TableBatch::new(CONTACTS, rows),
            TableBatch::new(GROUP_CONTACTS, memberships),
        ])
    }
}

/// Flows, then every run of every flow with its values.
pub struct FlowsSource {
    client: RapidProClient,
}

impl FlowsSource {
    pub fn new(client: RapidProClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Source for FlowsSource {
    fn name(&self) -> &str { "flows" }

    fn produces(&self) -> Vec<&str> { vec![FLOWS, FLOW_RUNS, FLOW_RUN_VALUES] }

    async fn extract(&self, watermarks: &Watermarks) -> SyncResult<Vec<TableBatch>> {
        let flows = self.client.flows().await?;
        let flow_rows: Vec<Row> = flows.iter().map(flatten::flow_row).collect();

        let after = watermarks.after(FLOW_RUNS);
        let mut runs: Vec<Row> = Vec::new();
        let mut values: Vec<Row> = Vec::new();
        for flow in &flows {
            let endpoint = self.client.runs(&flow.uuid, after.as_deref())?;
            let mut pages = Box::pin(endpoint.pages::<Run>());
            let mut flow_runs = 0;
            while let Some(page) = pages.try_next().await? {
                flow_runs += page.len();
                for run in &page {
                    runs.push(flatten::run_row(run));
                    values.extend(flatten::run_value_rows(run));
                }
            }
            tracing::debug!(flow = %flow.uuid, runs = flow_runs, total = runs.len(), "fetched runs");
        }

        Ok(vec![
            TableBatch::new(FLOWS, flow_rows),
            TableBatch::new(FLOW_RUNS, runs),
            TableBatch::new(FLOW_RUN_VALUES, values),
        ])
    }
}

pub struct PageViewsSource {
    client: ContentRepoClient,
}

impl PageViewsSource {
    pub fn new(client: ContentRepoClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Source for PageViewsSource {
    fn name(&self) -> &str { "page_views" }

    fn produces(&self) -> Vec<&str> { vec![PAGE_VIEWS] }

    async fn extract(&self, watermarks: &Watermarks) -> SyncResult<Vec<TableBatch>> {
        let since = watermarks.after(PAGE_VIEWS);
        let views = self.client.page_views(since.as_deref()).await?;
        let rows: Vec<Row> = views.iter().map(flatten::page_view_row).collect();
        Ok(vec![TableBatch::new(PAGE_VIEWS, rows)])
    }
}

/// Configured contact fields the workspace does not define.
pub async fn check_contact_fields(client: &RapidProClient, configured: &[String]) -> SyncResult<Vec<String>> {
    let known: HashSet<String> = client.fields().await?.into_iter().map(|f| f.key).collect();
    let unknown: Vec<String> = configured
        .iter()
        .filter(|name| !known.contains(*name))
        .cloned()
        .collect();
    for name in &unknown {
        tracing::warn!(field = %name, "configured contact field is not defined in RapidPro");
    }
    Ok(unknown)
}
