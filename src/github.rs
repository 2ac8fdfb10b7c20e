//! Native GitHub API integration
//!
//! Issues and Projects (v2) are read through GraphQL with one typed result
//! struct per query; merged-PR lookups go through REST. All mutations are
//! exposed behind the [`BoardApi`] trait so the fix executor can run
//! against a fake in tests.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use git2::Repository;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::metrics::TextFieldValues;
use crate::model::{IssueState, WorkItem};

const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";
const API_TIMEOUT_SECS: u64 = 60;
const USER_AGENT: &str = "driftwatch";

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

// ============================================================================
// Token Management
// ============================================================================

/// Resolve a GitHub token: environment variables first, then the `gh` CLI's
/// stored credentials.
pub fn resolve_token() -> Option<String> {
    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(token) = std::env::var(var) {
            if !token.is_empty() {
                return Some(token);
            }
        }
    }
    gh_auth_token()
}

fn gh_auth_token() -> Option<String> {
    let output = Command::new("gh").args(["auth", "token"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!token.is_empty()).then_some(token)
}

/// Sanitize an API error body to prevent credential leakage.
/// Truncates long responses and redacts potential secrets.
fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "ghp_",
        "gho_",
        "github_pat_",
    ];

    let truncated = if body.len() > MAX_ERROR_BODY_LEN {
        format!("{}... (truncated)", &body[..MAX_ERROR_BODY_LEN])
    } else {
        body.to_string()
    };

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(error details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated
}

// ============================================================================
// Remote Parsing
// ============================================================================

/// Extract owner and repo from a git remote URL.
///
/// Supports:
/// - git@github.com:owner/repo.git
/// - https://github.com/owner/repo.git
/// - https://github.com/owner/repo
pub fn parse_remote_url(url: &str) -> Option<(String, String)> {
    if let Some(rest) = url.strip_prefix("git@github.com:") {
        let path = rest.trim_end_matches(".git");
        let parts: Vec<&str> = path.splitn(2, '/').collect();
        if parts.len() == 2 && !parts[1].is_empty() {
            return Some((parts[0].to_string(), parts[1].to_string()));
        }
    }

    if url.contains("github.com") {
        if let Ok(parsed) = url::Url::parse(url) {
            if parsed.host_str() != Some("github.com") {
                return None;
            }
            let path = parsed
                .path()
                .trim_start_matches('/')
                .trim_end_matches(".git");
            let parts: Vec<&str> = path.splitn(2, '/').collect();
            if parts.len() == 2 && !parts[1].is_empty() {
                return Some((parts[0].to_string(), parts[1].to_string()));
            }
        }
    }

    None
}

/// Get the owner and repo from the repository's remotes.
pub fn get_remote_info(repo_path: &Path) -> Result<(String, String)> {
    let repo = Repository::open(repo_path).context("Failed to open repository")?;

    for remote_name in ["origin", "upstream", "github"] {
        if let Ok(remote) = repo.find_remote(remote_name) {
            if let Some(url) = remote.url() {
                if let Some((owner, repo_name)) = parse_remote_url(url) {
                    return Ok((owner, repo_name));
                }
            }
        }
    }

    Err(anyhow!(
        "No GitHub remote found. Make sure you have a remote pointing to github.com"
    ))
}

// ============================================================================
// Board Types
// ============================================================================

/// One option of a single-select board field.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldOption {
    pub id: String,
    pub name: String,
}

/// A board field definition: id, type, and select options if any.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub id: String,
    pub data_type: String,
    pub options: Vec<FieldOption>,
}

impl FieldDef {
    pub fn option_id(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.id.as_str())
    }
}

/// Field definitions for one board, keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct BoardFields {
    fields: HashMap<String, FieldDef>,
}

impl BoardFields {
    pub fn new(fields: HashMap<String, FieldDef>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }
}

/// Reason passed to the close-issue mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Completed,
    NotPlanned,
}

impl CloseReason {
    fn as_graphql(&self) -> &'static str {
        match self {
            CloseReason::Completed => "COMPLETED",
            CloseReason::NotPlanned => "NOT_PLANNED",
        }
    }
}

/// A merged pull request as seen by the auto-detection heuristics.
#[derive(Debug, Clone)]
pub struct PrSummary {
    pub number: u64,
    pub title: String,
    pub body: String,
}

/// Work items plus the free-text board field values collected alongside
/// them, keyed by board-item ref.
#[derive(Debug, Clone, Default)]
pub struct WorkItemBatch {
    pub items: Vec<WorkItem>,
    pub text_fields: TextFieldValues,
}

// ============================================================================
// Mutation Surface
// ============================================================================

/// The subset of the API the fix executor and PR auto-detection consume.
/// Production code uses [`GitHubClient`]; tests substitute a fake.
#[allow(async_fn_in_trait)]
pub trait BoardApi {
    /// Resolve an issue number to its node id.
    async fn issue_id(&self, number: u64) -> Result<String>;

    /// Close an issue with the given reason.
    async fn close_issue(&self, issue_id: &str, reason: CloseReason) -> Result<()>;

    /// Fetch a board's field definitions.
    async fn board_fields(&self, board_ref: &str) -> Result<BoardFields>;

    /// Set a single-select field to one of its options.
    async fn set_select_field(
        &self,
        board_ref: &str,
        item_ref: &str,
        field_id: &str,
        option_id: &str,
    ) -> Result<()>;

    /// Set a free-text field to a raw string value.
    async fn set_text_field(
        &self,
        board_ref: &str,
        item_ref: &str,
        field_id: &str,
        value: &str,
    ) -> Result<()>;

    /// Merged PRs whose source branch equals `branch`.
    async fn merged_prs_for_branch(&self, branch: &str) -> Result<Vec<PrSummary>>;

    /// Merged PRs whose body mentions `#<issue_number>`.
    async fn merged_prs_mentioning(&self, issue_number: u64) -> Result<Vec<PrSummary>>;
}

// ============================================================================
// GraphQL Plumbing
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

// ============================================================================
// Work Item Query
// ============================================================================

const WORK_ITEMS_QUERY: &str = r#"
query($owner: String!, $name: String!, $states: [IssueState!], $pageSize: Int!, $cursor: String) {
  repository(owner: $owner, name: $name) {
    issues(first: $pageSize, after: $cursor, states: $states, orderBy: {field: UPDATED_AT, direction: DESC}) {
      pageInfo { hasNextPage endCursor }
      nodes {
        id
        number
        title
        url
        state
        closedAt
        labels(first: 20) { nodes { name } }
        assignees(first: 10) { nodes { login } }
        projectItems(first: 10) {
          nodes {
            id
            project { id title }
            fieldValues(first: 20) {
              nodes {
                ... on ProjectV2ItemFieldSingleSelectValue {
                  name
                  field { ... on ProjectV2FieldCommon { name } }
                }
                ... on ProjectV2ItemFieldTextValue {
                  text
                  field { ... on ProjectV2FieldCommon { name } }
                }
              }
            }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct IssuesData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
struct RepositoryNode {
    issues: IssueConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueConnection {
    page_info: PageInfo,
    nodes: Option<Vec<Option<IssueNode>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueNode {
    number: u64,
    title: String,
    url: String,
    state: String,
    closed_at: Option<DateTime<Utc>>,
    labels: Option<NamedConnection>,
    assignees: Option<LoginConnection>,
    project_items: Option<ProjectItemConnection>,
}

#[derive(Debug, Deserialize)]
struct NamedConnection {
    nodes: Option<Vec<Option<NamedNode>>>,
}

#[derive(Debug, Deserialize)]
struct NamedNode {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginConnection {
    nodes: Option<Vec<Option<LoginNode>>>,
}

#[derive(Debug, Deserialize)]
struct LoginNode {
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectItemConnection {
    nodes: Option<Vec<Option<ProjectItemNode>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectItemNode {
    id: String,
    project: Option<ProjectRef>,
    field_values: Option<FieldValueConnection>,
}

#[derive(Debug, Deserialize)]
struct ProjectRef {
    id: String,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FieldValueConnection {
    nodes: Option<Vec<Option<FieldValueNode>>>,
}

/// One value in the fieldValues connection. Which members are present
/// depends on the concrete value type, so everything is optional.
#[derive(Debug, Deserialize)]
struct FieldValueNode {
    name: Option<String>,
    text: Option<String>,
    field: Option<FieldNameRef>,
}

#[derive(Debug, Deserialize)]
struct FieldNameRef {
    name: Option<String>,
}

fn parse_issue_state(state: &str) -> Option<IssueState> {
    match state {
        "OPEN" => Some(IssueState::Open),
        "CLOSED" => Some(IssueState::Closed),
        _ => None,
    }
}

/// Convert one fetched issue into a [`WorkItem`], recording its board text
/// fields into `text_fields`. The board item belonging to the board whose
/// title equals the repository name wins; otherwise the first one present.
fn work_item_from_node(
    node: IssueNode,
    repo_name: &str,
    text_fields: &mut TextFieldValues,
) -> Option<WorkItem> {
    let state = match parse_issue_state(&node.state) {
        Some(state) => state,
        None => {
            debug!(number = node.number, state = %node.state, "skipping issue with unknown state");
            return None;
        }
    };

    let labels: Vec<String> = node
        .labels
        .and_then(|c| c.nodes)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|n| n.name)
        .collect();
    let assignees: Vec<String> = node
        .assignees
        .and_then(|c| c.nodes)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|n| n.login)
        .collect();

    let board_items: Vec<ProjectItemNode> = node
        .project_items
        .and_then(|c| c.nodes)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .collect();
    let preferred = board_items
        .iter()
        .position(|item| {
            item.project
                .as_ref()
                .and_then(|p| p.title.as_deref())
                .map(|title| title == repo_name)
                .unwrap_or(false)
        })
        .unwrap_or(0);

    let mut board_status = None;
    let mut priority = None;
    let mut size = None;
    let mut board_item_ref = None;
    let mut board_ref = None;

    if let Some(item) = board_items.into_iter().nth(preferred) {
        if let Some(project) = item.project {
            board_ref = Some(project.id);
            board_item_ref = Some(item.id.clone());

            let mut texts: HashMap<String, String> = HashMap::new();
            for value in item
                .field_values
                .and_then(|c| c.nodes)
                .unwrap_or_default()
                .into_iter()
                .flatten()
            {
                let field_name = match value.field.and_then(|f| f.name) {
                    Some(name) => name,
                    None => continue,
                };
                if let Some(selected) = value.name {
                    match field_name.as_str() {
                        "Status" => board_status = Some(selected),
                        "Priority" => priority = Some(selected),
                        "Size" => size = Some(selected),
                        _ => {}
                    }
                } else if let Some(text) = value.text {
                    texts.insert(field_name, text);
                }
            }
            if !texts.is_empty() {
                text_fields.insert(item.id, texts);
            }
        }
    }

    Some(WorkItem {
        number: node.number,
        title: node.title,
        url: node.url,
        state,
        closed_at: node.closed_at,
        labels,
        assignees,
        board_status,
        priority,
        size,
        board_item_ref,
        board_ref,
    })
}

// ============================================================================
// Board Field Query
// ============================================================================

const BOARD_FIELDS_QUERY: &str = r#"
query($projectId: ID!) {
  node(id: $projectId) {
    ... on ProjectV2 {
      fields(first: 50) {
        nodes {
          ... on ProjectV2FieldCommon { id name dataType }
          ... on ProjectV2SingleSelectField { id name dataType options { id name } }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct NodeData {
    node: Option<ProjectNode>,
}

#[derive(Debug, Deserialize)]
struct ProjectNode {
    fields: Option<FieldConnection>,
}

#[derive(Debug, Deserialize)]
struct FieldConnection {
    nodes: Option<Vec<Option<FieldNode>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldNode {
    id: Option<String>,
    name: Option<String>,
    data_type: Option<String>,
    options: Option<Vec<FieldOption>>,
}

// ============================================================================
// Mutations
// ============================================================================

const UPDATE_SELECT_FIELD_MUTATION: &str = r#"
mutation($projectId: ID!, $itemId: ID!, $fieldId: ID!, $optionId: String!) {
  updateProjectV2ItemFieldValue(
    input: {projectId: $projectId, itemId: $itemId, fieldId: $fieldId, value: {singleSelectOptionId: $optionId}}
  ) {
    projectV2Item { id }
  }
}
"#;

const UPDATE_TEXT_FIELD_MUTATION: &str = r#"
mutation($projectId: ID!, $itemId: ID!, $fieldId: ID!, $text: String!) {
  updateProjectV2ItemFieldValue(
    input: {projectId: $projectId, itemId: $itemId, fieldId: $fieldId, value: {text: $text}}
  ) {
    projectV2Item { id }
  }
}
"#;

const CLOSE_ISSUE_MUTATION: &str = r#"
mutation($issueId: ID!, $reason: IssueClosedStateReason!) {
  closeIssue(input: {issueId: $issueId, stateReason: $reason}) {
    issue { id }
  }
}
"#;

const ISSUE_ID_QUERY: &str = r#"
query($owner: String!, $name: String!, $number: Int!) {
  repository(owner: $owner, name: $name) {
    issue(number: $number) { id }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct IssueIdData {
    repository: Option<IssueIdRepository>,
}

#[derive(Debug, Deserialize)]
struct IssueIdRepository {
    issue: Option<IdNode>,
}

#[derive(Debug, Deserialize)]
struct IdNode {
    id: String,
}

// Mutation results only confirm the touched node; the payload is ignored.
#[derive(Debug, Deserialize)]
struct IgnoredData {}

// ============================================================================
// REST Responses
// ============================================================================

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    body: Option<String>,
    merged_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    number: u64,
    title: String,
    body: Option<String>,
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

// ============================================================================
// Client
// ============================================================================

/// Authenticated client scoped to one repository.
pub struct GitHubClient {
    client: reqwest::Client,
    token: String,
    owner: String,
    repo: String,
}

impl GitHubClient {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self> {
        let token = resolve_token().ok_or_else(|| {
            anyhow!("No GitHub token found. Set GITHUB_TOKEN or authenticate with 'gh auth login'.")
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            token,
            owner: owner.into(),
            repo: repo.into(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let resp = self
            .client
            .post(GITHUB_GRAPHQL_URL)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .context("Failed to send GraphQL request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "GitHub GraphQL error ({}): {}",
                status,
                sanitize_error_body(&body)
            ));
        }

        let parsed: GraphQlResponse<T> = resp
            .json()
            .await
            .context("Failed to parse GraphQL response")?;

        if let Some(errors) = parsed.errors {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(anyhow!("GitHub GraphQL error: {}", messages.join("; ")));
        }
        parsed
            .data
            .ok_or_else(|| anyhow!("GitHub GraphQL response carried no data"))
    }

    async fn rest_get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", GITHUB_API_URL, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await
            .with_context(|| format!("Failed to GET {}", path))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "GitHub API error ({}): {}",
                status,
                sanitize_error_body(&body)
            ));
        }
        resp.json().await.context("Failed to parse API response")
    }

    /// Login of the authenticated user.
    pub async fn current_login(&self) -> Result<String> {
        let user: UserResponse = self.rest_get("/user", &[]).await?;
        Ok(user.login)
    }

    /// Fetch up to `limit` work items in the given lifecycle states,
    /// following cursors until exhausted or the cap is reached.
    pub async fn fetch_work_items(
        &self,
        states: &[IssueState],
        limit: usize,
    ) -> Result<WorkItemBatch> {
        let states: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
        let mut batch = WorkItemBatch::default();
        let mut cursor: Option<String> = None;

        while batch.items.len() < limit {
            let page_size = (limit - batch.items.len()).min(100) as u64;
            let data: IssuesData = self
                .graphql(
                    WORK_ITEMS_QUERY,
                    json!({
                        "owner": self.owner,
                        "name": self.repo,
                        "states": states,
                        "pageSize": page_size,
                        "cursor": cursor,
                    }),
                )
                .await?;

            let connection = match data.repository {
                Some(repository) => repository.issues,
                None => return Err(anyhow!("Repository {}/{} not found", self.owner, self.repo)),
            };

            for node in connection.nodes.unwrap_or_default().into_iter().flatten() {
                if let Some(item) = work_item_from_node(node, &self.repo, &mut batch.text_fields) {
                    batch.items.push(item);
                }
                if batch.items.len() >= limit {
                    break;
                }
            }

            if !connection.page_info.has_next_page {
                break;
            }
            cursor = connection.page_info.end_cursor;
            if cursor.is_none() {
                break;
            }
        }

        debug!(
            count = batch.items.len(),
            "fetched work items for {}/{}", self.owner, self.repo
        );
        Ok(batch)
    }
}

impl BoardApi for GitHubClient {
    async fn issue_id(&self, number: u64) -> Result<String> {
        let data: IssueIdData = self
            .graphql(
                ISSUE_ID_QUERY,
                json!({ "owner": self.owner, "name": self.repo, "number": number }),
            )
            .await?;
        data.repository
            .and_then(|r| r.issue)
            .map(|i| i.id)
            .ok_or_else(|| anyhow!("Issue #{} not found in {}/{}", number, self.owner, self.repo))
    }

    async fn close_issue(&self, issue_id: &str, reason: CloseReason) -> Result<()> {
        let _: IgnoredData = self
            .graphql(
                CLOSE_ISSUE_MUTATION,
                json!({ "issueId": issue_id, "reason": reason.as_graphql() }),
            )
            .await?;
        Ok(())
    }

    async fn board_fields(&self, board_ref: &str) -> Result<BoardFields> {
        let data: NodeData = self
            .graphql(BOARD_FIELDS_QUERY, json!({ "projectId": board_ref }))
            .await?;

        let mut fields = HashMap::new();
        let nodes = data
            .node
            .and_then(|n| n.fields)
            .and_then(|f| f.nodes)
            .unwrap_or_default();
        for node in nodes.into_iter().flatten() {
            if let (Some(id), Some(name)) = (node.id, node.name) {
                fields.insert(
                    name,
                    FieldDef {
                        id,
                        data_type: node.data_type.unwrap_or_default(),
                        options: node.options.unwrap_or_default(),
                    },
                );
            }
        }
        Ok(BoardFields::new(fields))
    }

    async fn set_select_field(
        &self,
        board_ref: &str,
        item_ref: &str,
        field_id: &str,
        option_id: &str,
    ) -> Result<()> {
        let _: IgnoredData = self
            .graphql(
                UPDATE_SELECT_FIELD_MUTATION,
                json!({
                    "projectId": board_ref,
                    "itemId": item_ref,
                    "fieldId": field_id,
                    "optionId": option_id,
                }),
            )
            .await?;
        Ok(())
    }

    async fn set_text_field(
        &self,
        board_ref: &str,
        item_ref: &str,
        field_id: &str,
        value: &str,
    ) -> Result<()> {
        let _: IgnoredData = self
            .graphql(
                UPDATE_TEXT_FIELD_MUTATION,
                json!({
                    "projectId": board_ref,
                    "itemId": item_ref,
                    "fieldId": field_id,
                    "text": value,
                }),
            )
            .await?;
        Ok(())
    }

    async fn merged_prs_for_branch(&self, branch: &str) -> Result<Vec<PrSummary>> {
        let path = format!("/repos/{}/{}/pulls", self.owner, self.repo);
        let pulls: Vec<PullResponse> = self
            .rest_get(
                &path,
                &[
                    ("state", "closed".to_string()),
                    ("head", format!("{}:{}", self.owner, branch)),
                    ("per_page", "20".to_string()),
                ],
            )
            .await?;
        Ok(pulls
            .into_iter()
            .filter(|p| p.merged_at.is_some())
            .map(|p| PrSummary {
                number: p.number,
                title: p.title,
                body: p.body.unwrap_or_default(),
            })
            .collect())
    }

    async fn merged_prs_mentioning(&self, issue_number: u64) -> Result<Vec<PrSummary>> {
        let query = format!(
            "repo:{}/{} is:pr is:merged \"#{}\" in:body",
            self.owner, self.repo, issue_number
        );
        let found: SearchResponse = self
            .rest_get(
                "/search/issues",
                &[("q", query), ("per_page", "20".to_string())],
            )
            .await?;
        Ok(found
            .items
            .into_iter()
            .filter(|i| i.pull_request.is_some())
            .map(|i| PrSummary {
                number: i.number,
                title: i.title,
                body: i.body.unwrap_or_default(),
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ssh_remote() {
        let (owner, repo) = parse_remote_url("git@github.com:acme/widgets.git").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn test_parse_https_remote() {
        let (owner, repo) = parse_remote_url("https://github.com/acme/widgets.git").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");

        let (owner, repo) = parse_remote_url("https://github.com/acme/widgets").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn test_parse_invalid_remotes() {
        assert!(parse_remote_url("https://gitlab.com/user/repo").is_none());
        assert!(parse_remote_url("https://github.mycompany.com/owner/repo").is_none());
        assert!(parse_remote_url("not-a-url").is_none());
        assert!(parse_remote_url("https://github.com/owner").is_none());
        assert!(parse_remote_url("").is_none());
    }

    #[test]
    fn test_sanitize_error_body_redacts_and_truncates() {
        assert_eq!(
            sanitize_error_body("bad credentials: ghp_abc123"),
            "(error details redacted - may contain sensitive data)"
        );
        let long = "x".repeat(500);
        assert!(sanitize_error_body(&long).ends_with("(truncated)"));
        assert_eq!(sanitize_error_body("plain failure"), "plain failure");
    }

    fn issue_node_json(project_items: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "I_abc",
            "number": 42,
            "title": "Fix drift",
            "url": "https://github.com/acme/widgets/issues/42",
            "state": "OPEN",
            "closedAt": null,
            "labels": { "nodes": [{ "name": "bug" }] },
            "assignees": { "nodes": [{ "login": "octocat" }] },
            "projectItems": project_items,
        })
    }

    #[test]
    fn test_work_item_prefers_board_titled_like_repo() {
        let node: IssueNode = serde_json::from_value(issue_node_json(json!({
            "nodes": [
                {
                    "id": "PVTI_other",
                    "project": { "id": "PVT_other", "title": "Roadmap" },
                    "fieldValues": { "nodes": [
                        { "name": "Backlog", "field": { "name": "Status" } }
                    ]}
                },
                {
                    "id": "PVTI_main",
                    "project": { "id": "PVT_main", "title": "widgets" },
                    "fieldValues": { "nodes": [
                        { "name": "In Progress", "field": { "name": "Status" } },
                        { "name": "P1", "field": { "name": "Priority" } },
                        { "text": "2025-06-01", "field": { "name": "Started" } },
                        {}
                    ]}
                }
            ]
        })))
        .unwrap();

        let mut text_fields = TextFieldValues::default();
        let item = work_item_from_node(node, "widgets", &mut text_fields).unwrap();

        assert_eq!(item.number, 42);
        assert_eq!(item.state, IssueState::Open);
        assert_eq!(item.labels, vec!["bug".to_string()]);
        assert_eq!(item.assignees, vec!["octocat".to_string()]);
        assert_eq!(item.board_status.as_deref(), Some("In Progress"));
        assert_eq!(item.priority.as_deref(), Some("P1"));
        assert_eq!(item.board_item_ref.as_deref(), Some("PVTI_main"));
        assert_eq!(item.board_ref.as_deref(), Some("PVT_main"));
        assert_eq!(
            text_fields["PVTI_main"].get("Started").map(String::as_str),
            Some("2025-06-01")
        );
    }

    #[test]
    fn test_work_item_falls_back_to_first_board_item() {
        let node: IssueNode = serde_json::from_value(issue_node_json(json!({
            "nodes": [
                {
                    "id": "PVTI_a",
                    "project": { "id": "PVT_a", "title": "Roadmap" },
                    "fieldValues": { "nodes": [
                        { "name": "Done", "field": { "name": "Status" } }
                    ]}
                },
                {
                    "id": "PVTI_b",
                    "project": { "id": "PVT_b", "title": "Icebox" },
                    "fieldValues": { "nodes": [] }
                }
            ]
        })))
        .unwrap();

        let mut text_fields = TextFieldValues::default();
        let item = work_item_from_node(node, "widgets", &mut text_fields).unwrap();
        assert_eq!(item.board_item_ref.as_deref(), Some("PVTI_a"));
        assert_eq!(item.board_status.as_deref(), Some("Done"));
    }

    #[test]
    fn test_work_item_off_board_has_null_handles() {
        let node: IssueNode =
            serde_json::from_value(issue_node_json(json!({ "nodes": [] }))).unwrap();
        let mut text_fields = TextFieldValues::default();
        let item = work_item_from_node(node, "widgets", &mut text_fields).unwrap();
        assert!(item.board_status.is_none());
        assert!(item.board_item_ref.is_none());
        assert!(item.board_ref.is_none());
        assert!(text_fields.is_empty());
    }

    #[test]
    fn test_unknown_issue_state_is_skipped() {
        let mut value = issue_node_json(json!({ "nodes": [] }));
        value["state"] = json!("MERGED");
        let node: IssueNode = serde_json::from_value(value).unwrap();
        let mut text_fields = TextFieldValues::default();
        assert!(work_item_from_node(node, "widgets", &mut text_fields).is_none());
    }

    #[test]
    fn test_board_field_option_lookup() {
        let fields = BoardFields::new(HashMap::from([(
            "Status".to_string(),
            FieldDef {
                id: "F_status".to_string(),
                data_type: "SINGLE_SELECT".to_string(),
                options: vec![
                    FieldOption {
                        id: "opt_done".to_string(),
                        name: "Done".to_string(),
                    },
                    FieldOption {
                        id: "opt_wip".to_string(),
                        name: "In Progress".to_string(),
                    },
                ],
            },
        )]));
        let status = fields.field("Status").unwrap();
        assert_eq!(status.option_id("Done"), Some("opt_done"));
        assert_eq!(status.option_id("done"), None);
        assert!(fields.field("Sprint").is_none());
    }

    #[test]
    fn test_graphql_error_response_parses() {
        let json = r#"{"data": null, "errors": [{"message": "Bad credentials"}]}"#;
        let parsed: GraphQlResponse<IssuesData> = serde_json::from_str(json).unwrap();
        assert!(parsed.data.is_none());
        assert_eq!(parsed.errors.unwrap()[0].message, "Bad credentials");
    }

    #[test]
    fn test_board_fields_response_parses() {
        let json = r#"{
            "node": {
                "fields": {
                    "nodes": [
                        { "id": "F_title", "name": "Title", "dataType": "TITLE" },
                        { "id": "F_status", "name": "Status", "dataType": "SINGLE_SELECT",
                          "options": [{ "id": "opt_done", "name": "Done" }] },
                        {}
                    ]
                }
            }
        }"#;
        let data: NodeData = serde_json::from_str(json).unwrap();
        let nodes = data.node.unwrap().fields.unwrap().nodes.unwrap();
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn test_pull_response_merge_filter_shape() {
        let json = r#"[
            {"number": 7, "title": "Fix", "body": "Closes #42", "merged_at": "2025-06-01T10:00:00Z"},
            {"number": 8, "title": "Abandoned", "body": null, "merged_at": null}
        ]"#;
        let pulls: Vec<PullResponse> = serde_json::from_str(json).unwrap();
        let merged: Vec<&PullResponse> = pulls.iter().filter(|p| p.merged_at.is_some()).collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].number, 7);
    }
}
