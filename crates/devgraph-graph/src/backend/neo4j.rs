//! Neo4j backend.
//!
//! Nodes are stored as `(:KnowledgeNode:<Type>)` with the property map kept as
//! a JSON string in `props`; `title`, `status` and `content` are promoted to
//! real properties for indexing. Timestamps are RFC 3339 strings with a fixed
//! precision so they sort lexically.

use std::collections::BTreeSet;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use neo4rs::{
    BoltNull, BoltType, Neo4jClientErrorKind, Neo4jErrorKind, Neo4jSecurityErrorKind, Query, Row,
};
use tracing::debug;

use devgraph_core::config::GraphConfig;
use devgraph_core::retry::with_retry;
use devgraph_core::{
    DevgraphError, DevgraphResult, GraphCounts, Node, NodeType, Pagination, Project, Properties,
    Relationship, RetryPolicy, StatusEvent, Visibility,
};

use super::{GraphBackend, ScoredNode};
use crate::client::GraphClient;
use crate::schema::VECTOR_INDEX;

/// Fields returned for every node read.
const NODE_RETURN: &str = "n.id AS id, n.graph_id AS graph_id, n.node_type AS node_type, \
     n.props AS props, \
     CASE WHEN n.embedding IS NULL THEN null ELSE n.embedding_model END AS embedding_model, \
     n.content_hash AS content_hash, n.created_at AS created_at, n.updated_at AS updated_at, \
     n.edited_by AS edited_by, n.synced_at AS synced_at";

/// The vector index spans every tenant, so ask it for more candidates than
/// one tenant needs before filtering by `graph_id`.
const TENANT_OVERFETCH: usize = 10;

const CONSTRAINT_VIOLATION: &str = "Neo.ClientError.Schema.ConstraintValidationFailed";

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn nullable(value: Option<&str>) -> BoltType {
    match value {
        Some(v) => v.into(),
        None => BoltType::Null(BoltNull),
    }
}

fn field<T: serde::de::DeserializeOwned>(row: &Row, name: &str) -> anyhow::Result<T> {
    row.get(name)
        .map_err(|e| anyhow!("Failed to get field '{}': {:?}", name, e))
}

fn optional(row: &Row, name: &str) -> Option<String> {
    row.get::<Option<String>>(name).ok().flatten()
}

fn node_from_row(row: &Row) -> anyhow::Result<Node> {
    let node_type: String = field(row, "node_type")?;
    let props: String = field(row, "props")?;
    let properties: Properties =
        serde_json::from_str(&props).context("Stored node properties are not valid JSON")?;

    Ok(Node {
        id: field(row, "id")?,
        graph_id: field(row, "graph_id")?,
        node_type: node_type.parse()?,
        properties,
        embedding: None,
        embedding_model: optional(row, "embedding_model"),
        content_hash: field(row, "content_hash")?,
        created_at: parse_ts(&field::<String>(row, "created_at")?)?,
        updated_at: parse_ts(&field::<String>(row, "updated_at")?)?,
        edited_by: optional(row, "edited_by"),
        synced_at: optional(row, "synced_at").map(|s| parse_ts(&s)).transpose()?,
    })
}

fn event_from_row(row: &Row) -> anyhow::Result<StatusEvent> {
    Ok(StatusEvent {
        id: field(row, "id")?,
        graph_id: field(row, "graph_id")?,
        entity_type: field(row, "entity_type")?,
        entity_id: field(row, "entity_id")?,
        old_status: field(row, "old_status")?,
        new_status: field(row, "new_status")?,
        changed_by: field(row, "changed_by")?,
        timestamp: parse_ts(&field::<String>(row, "timestamp")?)?,
        reason: optional(row, "reason"),
    })
}

fn project_from_row(row: &Row) -> anyhow::Result<Project> {
    let visibility: String = field(row, "visibility")?;
    let owners: Vec<String> = field(row, "owners")?;
    let members: Vec<String> = row.get("members").unwrap_or_default();
    Ok(Project {
        id: field(row, "id")?,
        github_repo_url: optional(row, "github_repo_url"),
        visibility: visibility.parse::<Visibility>()?,
        owners: owners.into_iter().collect::<BTreeSet<_>>(),
        members: members.into_iter().collect(),
        created_at: parse_ts(&field::<String>(row, "created_at")?)?,
        updated_at: parse_ts(&field::<String>(row, "updated_at")?)?,
    })
}

/// Map a server status code such as `Neo.ClientError.Statement.SyntaxError`.
fn classify_status(code: &str, msg: String) -> DevgraphError {
    if code == CONSTRAINT_VIOLATION {
        return DevgraphError::validation(msg);
    }
    match Neo4jErrorKind::from(code) {
        Neo4jErrorKind::Transient
        | Neo4jErrorKind::Client(
            Neo4jClientErrorKind::SessionExpired
            | Neo4jClientErrorKind::Security(Neo4jSecurityErrorKind::AuthorizationExpired),
        ) => DevgraphError::transient(msg),
        Neo4jErrorKind::Client(
            Neo4jClientErrorKind::Security(_) | Neo4jClientErrorKind::FatalDiscovery,
        ) => DevgraphError::unavailable(msg),
        _ => DevgraphError::internal(msg),
    }
}

/// Classify a driver failure.
///
/// Broken connections are retried. A store we cannot log into or locate is
/// unavailable. Constraint violations are the caller's fault; every other
/// query failure is ours.
fn classify(e: anyhow::Error, operation: &str) -> DevgraphError {
    let msg = format!("{}: {:#}", operation, e);
    let Some(cause) = e.chain().find_map(|c| c.downcast_ref::<neo4rs::Error>()) else {
        return DevgraphError::internal(msg);
    };
    match cause {
        neo4rs::Error::IOError { .. } | neo4rs::Error::ConnectionError => {
            DevgraphError::transient(msg)
        }
        neo4rs::Error::Neo4j(status) => classify_status(status.code(), msg),
        neo4rs::Error::AuthenticationError(_)
        | neo4rs::Error::UrlParseError(_)
        | neo4rs::Error::UnsupportedScheme(_)
        | neo4rs::Error::InvalidDnsName(_)
        | neo4rs::Error::InvalidConfig
        | neo4rs::Error::UnsupportedVersion(_) => DevgraphError::unavailable(msg),
        _ => DevgraphError::internal(msg),
    }
}

fn decode<T>(result: anyhow::Result<T>) -> DevgraphResult<T> {
    result.map_err(|e| DevgraphError::internal(format!("{:#}", e)))
}

fn type_names(types: &[NodeType]) -> Vec<String> {
    types.iter().map(|t| t.label().to_string()).collect()
}

/// Drop every type label from `n` and put the current one back.
fn relabel(node_type: NodeType) -> String {
    let all: Vec<&str> = NodeType::ALL.iter().map(|t| t.label()).collect();
    format!("REMOVE n:{} SET n:{}", all.join(":"), node_type.label())
}

fn scored_from_rows(rows: &[Row]) -> DevgraphResult<Vec<ScoredNode>> {
    decode(
        rows.iter()
            .map(|row| {
                let score: f64 = field(row, "score")?;
                Ok(ScoredNode {
                    node: node_from_row(row)?,
                    // Both the index and vector.similarity.cosine report (1 + cos) / 2.
                    similarity: (2.0 * score - 1.0) as f32,
                })
            })
            .collect(),
    )
}

/// Graph storage in Neo4j.
pub struct Neo4jBackend {
    client: GraphClient,
    policy: RetryPolicy,
}

impl Neo4jBackend {
    pub fn new(client: GraphClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Connect, retrying transient failures under the policy.
    pub async fn connect(config: &GraphConfig, policy: RetryPolicy) -> DevgraphResult<Self> {
        let client = with_retry(&policy, "neo4j.connect", || async {
            GraphClient::connect(config)
                .await
                .map_err(|e| classify(e, "neo4j.connect"))
        })
        .await?;
        Ok(Self::new(client, policy))
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    async fn rows(&self, operation: &str, build: impl Fn() -> Query + Send + Sync) -> DevgraphResult<Vec<Row>> {
        with_retry(&self.policy, operation, || {
            let query = build();
            async move {
                self.client
                    .query(query)
                    .await
                    .map_err(|e| classify(e, operation))
            }
        })
        .await
    }

    async fn run(&self, operation: &str, build: impl Fn() -> Query + Send + Sync) -> DevgraphResult<()> {
        with_retry(&self.policy, operation, || {
            let query = build();
            async move {
                self.client
                    .execute(query)
                    .await
                    .map_err(|e| classify(e, operation))
            }
        })
        .await
    }

    async fn nodes(&self, operation: &str, build: impl Fn() -> Query + Send + Sync) -> DevgraphResult<Vec<Node>> {
        let rows = self.rows(operation, build).await?;
        decode(rows.iter().map(node_from_row).collect())
    }
}

/// Parameters shared by node writes.
fn with_node_params(query: Query, node: &Node) -> DevgraphResult<Query> {
    let props = serde_json::to_string(&node.properties)?;
    Ok(query
        .param("graph_id", node.graph_id.as_str())
        .param("id", node.id.as_str())
        .param("node_type", node.node_type.label())
        .param("props", props)
        .param("title", nullable(node.title()))
        .param("status", nullable(node.status()))
        .param("content", nullable(node.content()))
        .param("content_hash", node.content_hash.as_str())
        .param("created_at", ts(&node.created_at))
        .param("updated_at", ts(&node.updated_at))
        .param("edited_by", nullable(node.edited_by.as_deref()))
        .param("synced_at", nullable(node.synced_at.as_ref().map(ts).as_deref())))
}

const NODE_SET: &str = "n.node_type = $node_type, n.props = $props, n.title = $title, \
     n.status = $status, n.content = $content, n.content_hash = $content_hash, \
     n.updated_at = $updated_at, n.edited_by = $edited_by, n.synced_at = $synced_at";

#[async_trait]
impl GraphBackend for Neo4jBackend {
    async fn ping(&self) -> DevgraphResult<()> {
        with_retry(&self.policy, "neo4j.ping", || async {
            self.client.ping().await.map_err(|e| classify(e, "neo4j.ping"))
        })
        .await
    }

    async fn counts(&self, graph_id: Option<&str>) -> DevgraphResult<GraphCounts> {
        with_retry(&self.policy, "neo4j.counts", || async {
            self.client
                .get_counts(graph_id)
                .await
                .map_err(|e| classify(e, "neo4j.counts"))
        })
        .await
    }

    async fn insert_node(&self, node: &Node) -> DevgraphResult<()> {
        let cypher = format!(
            "OPTIONAL MATCH (e:KnowledgeNode {{graph_id: $graph_id, id: $id}})
             WITH e WHERE e IS NULL
             CREATE (n:KnowledgeNode:{} {{graph_id: $graph_id, id: $id, created_at: $created_at}})
             SET {}
             RETURN n.id AS id",
            node.node_type.label(),
            NODE_SET
        );
        let query = with_node_params(Query::new(cypher), node)?;
        let rows = self.rows("neo4j.insert_node", || query.clone()).await?;
        if rows.is_empty() {
            return Err(DevgraphError::validation(format!(
                "Node '{}' already exists in graph '{}'",
                node.id, node.graph_id
            )));
        }
        debug!(graph_id = %node.graph_id, node_id = %node.id, "Node inserted");
        Ok(())
    }

    async fn replace_node(&self, node: &Node) -> DevgraphResult<()> {
        let cypher = format!(
            "MATCH (n:KnowledgeNode {{graph_id: $graph_id, id: $id}})
             {}, {}
             RETURN n.id AS id",
            relabel(node.node_type),
            NODE_SET
        );
        let query = with_node_params(Query::new(cypher), node)?;
        let rows = self.rows("neo4j.replace_node", || query.clone()).await?;
        if rows.is_empty() {
            return Err(DevgraphError::not_found("Node", &node.id));
        }
        Ok(())
    }

    async fn upsert_node(&self, node: &Node) -> DevgraphResult<()> {
        let cypher = format!(
            "MERGE (n:KnowledgeNode {{graph_id: $graph_id, id: $id}})
             ON CREATE SET n.created_at = $created_at
             {}, {}",
            relabel(node.node_type),
            NODE_SET
        );
        let query = with_node_params(Query::new(cypher), node)?;
        self.run("neo4j.upsert_node", || query.clone()).await
    }

    async fn get_node(&self, graph_id: &str, id: &str) -> DevgraphResult<Option<Node>> {
        let cypher = format!(
            "MATCH (n:KnowledgeNode {{graph_id: $graph_id, id: $id}}) RETURN {}",
            NODE_RETURN
        );
        let nodes = self
            .nodes("neo4j.get_node", || {
                Query::new(cypher.clone())
                    .param("graph_id", graph_id)
                    .param("id", id)
            })
            .await?;
        Ok(nodes.into_iter().next())
    }

    async fn get_nodes(&self, graph_id: &str, ids: &[String]) -> DevgraphResult<Vec<Node>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cypher = format!(
            "MATCH (n:KnowledgeNode {{graph_id: $graph_id}}) WHERE n.id IN $ids RETURN {}",
            NODE_RETURN
        );
        self.nodes("neo4j.get_nodes", || {
            Query::new(cypher.clone())
                .param("graph_id", graph_id)
                .param("ids", ids.to_vec())
        })
        .await
    }

    async fn list_nodes(
        &self,
        graph_id: &str,
        types: &[NodeType],
        page: Pagination,
    ) -> DevgraphResult<(Vec<Node>, usize)> {
        let names = type_names(types);
        let filter = "MATCH (n:KnowledgeNode {graph_id: $graph_id})
                      WHERE size($types) = 0 OR n.node_type IN $types";

        let count_rows = self
            .rows("neo4j.count_nodes", || {
                Query::new(format!("{} RETURN count(n) AS total", filter))
                    .param("graph_id", graph_id)
                    .param("types", names.clone())
            })
            .await?;
        let total: i64 = match count_rows.first() {
            Some(row) => decode(field(row, "total"))?,
            None => 0,
        };

        let cypher = format!(
            "{} RETURN {} ORDER BY n.created_at ASC, n.id ASC SKIP $offset LIMIT $limit",
            filter, NODE_RETURN
        );
        let nodes = self
            .nodes("neo4j.list_nodes", || {
                Query::new(cypher.clone())
                    .param("graph_id", graph_id)
                    .param("types", names.clone())
                    .param("offset", page.offset)
                    .param("limit", page.limit)
            })
            .await?;

        Ok((nodes, total as usize))
    }

    async fn all_nodes(&self, graph_id: &str) -> DevgraphResult<Vec<Node>> {
        let cypher = format!(
            "MATCH (n:KnowledgeNode {{graph_id: $graph_id}}) RETURN {} ORDER BY n.created_at ASC, n.id ASC",
            NODE_RETURN
        );
        self.nodes("neo4j.all_nodes", || {
            Query::new(cypher.clone()).param("graph_id", graph_id)
        })
        .await
    }

    async fn delete_node(&self, graph_id: &str, id: &str) -> DevgraphResult<bool> {
        let rows = self
            .rows("neo4j.delete_node", || {
                Query::new(
                    "MATCH (n:KnowledgeNode {graph_id: $graph_id, id: $id})
                     WITH n, n.id AS id
                     DETACH DELETE n
                     RETURN id"
                        .to_string(),
                )
                .param("graph_id", graph_id)
                .param("id", id)
            })
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_relationship(&self, rel: &Relationship) -> DevgraphResult<()> {
        let props = serde_json::to_string(&rel.properties)?;
        let cypher = format!(
            "MATCH (a:KnowledgeNode {{graph_id: $graph_id, id: $source}})
             MATCH (b:KnowledgeNode {{graph_id: $graph_id, id: $target}})
             CREATE (a)-[r:{} {{graph_id: $graph_id, props: $props, created_at: $created_at}}]->(b)
             RETURN type(r) AS type",
            rel.rel_type.as_str()
        );
        let rows = self
            .rows("neo4j.insert_relationship", || {
                Query::new(cypher.clone())
                    .param("graph_id", rel.graph_id.as_str())
                    .param("source", rel.source_id.as_str())
                    .param("target", rel.target_id.as_str())
                    .param("props", props.clone())
                    .param("created_at", ts(&rel.created_at))
            })
            .await?;
        if rows.is_empty() {
            return Err(DevgraphError::validation(format!(
                "Relationship endpoints '{}' -> '{}' must both exist in graph '{}'",
                rel.source_id, rel.target_id, rel.graph_id
            )));
        }
        Ok(())
    }

    async fn neighbor_ids(&self, graph_id: &str, ids: &[String]) -> DevgraphResult<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .rows("neo4j.neighbors", || {
                Query::new(
                    "MATCH (s:KnowledgeNode {graph_id: $graph_id}) WHERE s.id IN $ids
                     MATCH (s)--(m:KnowledgeNode {graph_id: $graph_id})
                     RETURN DISTINCT m.id AS id"
                        .to_string(),
                )
                .param("graph_id", graph_id)
                .param("ids", ids.to_vec())
            })
            .await?;
        decode(rows.iter().map(|row| field::<String>(row, "id")).collect())
    }

    async fn set_embedding(
        &self,
        graph_id: &str,
        id: &str,
        embedding: &[f32],
        model: &str,
    ) -> DevgraphResult<()> {
        // neo4rs has no f32 list; the procedure stores the right type for the index.
        let embedding_f64: Vec<f64> = embedding.iter().map(|&x| x as f64).collect();
        let rows = self
            .rows("neo4j.set_embedding", || {
                Query::new(
                    "MATCH (n:KnowledgeNode {graph_id: $graph_id, id: $id})
                     CALL db.create.setNodeVectorProperty(n, 'embedding', $embedding)
                     SET n.embedding_model = $model
                     RETURN n.id AS id"
                        .to_string(),
                )
                .param("graph_id", graph_id)
                .param("id", id)
                .param("embedding", embedding_f64.clone())
                .param("model", model)
            })
            .await?;
        if rows.is_empty() {
            return Err(DevgraphError::not_found("Node", id));
        }
        Ok(())
    }

    async fn vector_search(
        &self,
        graph_id: &str,
        query: &[f32],
        model: &str,
        types: &[NodeType],
        candidates: usize,
    ) -> DevgraphResult<Vec<ScoredNode>> {
        let embedding_f64: Vec<f64> = query.iter().map(|&x| x as f64).collect();
        let names = type_names(types);
        let build = |cypher: &str| {
            Query::new(cypher.to_string())
                .param("pool", (candidates * TENANT_OVERFETCH) as i64)
                .param("embedding", embedding_f64.clone())
                .param("graph_id", graph_id)
                .param("model", model)
                .param("types", names.clone())
                .param("candidates", candidates as i64)
        };

        let indexed = format!(
            "CALL db.index.vector.queryNodes('{}', $pool, $embedding)
             YIELD node AS n, score
             WHERE n.graph_id = $graph_id AND n.embedding_model = $model
               AND (size($types) = 0 OR n.node_type IN $types)
             RETURN {}, score
             ORDER BY score DESC, id ASC
             LIMIT $candidates",
            VECTOR_INDEX, NODE_RETURN
        );
        let rows = self.rows("neo4j.vector_search", || build(&indexed)).await?;
        // A full pool holds this graph's best matches: anything better would
        // also have made the global cut.
        if rows.len() >= candidates {
            return scored_from_rows(&rows);
        }

        // Other graphs crowded the shared index; rank this graph exactly.
        debug!(graph_id, found = rows.len(), candidates, "Vector index pool short, scanning graph");
        let scan = format!(
            "MATCH (n:KnowledgeNode {{graph_id: $graph_id}})
             WHERE n.embedding IS NOT NULL AND n.embedding_model = $model
               AND (size($types) = 0 OR n.node_type IN $types)
             WITH n, vector.similarity.cosine(n.embedding, $embedding) AS score
             RETURN {}, score
             ORDER BY score DESC, id ASC
             LIMIT $candidates",
            NODE_RETURN
        );
        let rows = self.rows("neo4j.vector_scan", || build(&scan)).await?;
        scored_from_rows(&rows)
    }

    async fn count_embedded(&self, graph_id: &str, model: &str) -> DevgraphResult<usize> {
        let rows = self
            .rows("neo4j.count_embedded", || {
                Query::new(
                    "MATCH (n:KnowledgeNode {graph_id: $graph_id})
                     WHERE n.embedding IS NOT NULL AND n.embedding_model = $model
                     RETURN count(n) AS count"
                        .to_string(),
                )
                .param("graph_id", graph_id)
                .param("model", model)
            })
            .await?;
        let count: i64 = match rows.first() {
            Some(row) => decode(field(row, "count"))?,
            None => 0,
        };
        Ok(count as usize)
    }

    async fn nodes_needing_embedding(
        &self,
        graph_id: &str,
        model: &str,
        limit: usize,
    ) -> DevgraphResult<Vec<Node>> {
        let cypher = format!(
            "MATCH (n:KnowledgeNode {{graph_id: $graph_id}})
             WHERE n.embedding IS NULL OR n.embedding_model IS NULL OR n.embedding_model <> $model
             RETURN {}
             ORDER BY n.created_at ASC, n.id ASC
             LIMIT $limit",
            NODE_RETURN
        );
        self.nodes("neo4j.nodes_needing_embedding", || {
            Query::new(cypher.clone())
                .param("graph_id", graph_id)
                .param("model", model)
                .param("limit", limit as i64)
        })
        .await
    }

    async fn mark_synced(
        &self,
        graph_id: &str,
        ids: &[String],
        at: DateTime<Utc>,
    ) -> DevgraphResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.run("neo4j.mark_synced", || {
            Query::new(
                "MATCH (n:KnowledgeNode {graph_id: $graph_id}) WHERE n.id IN $ids
                 SET n.synced_at = $at"
                    .to_string(),
            )
            .param("graph_id", graph_id)
            .param("ids", ids.to_vec())
            .param("at", ts(&at))
        })
        .await
    }

    async fn find_active_sprint(&self, graph_id: &str) -> DevgraphResult<Option<Node>> {
        let cypher = format!(
            "MATCH (n:KnowledgeNode {{graph_id: $graph_id, node_type: 'Sprint'}})
             WHERE toLower(n.status) = 'active'
             RETURN {}
             ORDER BY n.updated_at DESC, n.id ASC
             LIMIT 1",
            NODE_RETURN
        );
        let nodes = self
            .nodes("neo4j.active_sprint", || {
                Query::new(cypher.clone()).param("graph_id", graph_id)
            })
            .await?;
        Ok(nodes.into_iter().next())
    }

    async fn append_event(&self, event: &StatusEvent) -> DevgraphResult<bool> {
        let rows = self
            .rows("neo4j.append_event", || {
                Query::new(
                    "OPTIONAL MATCH (e:StatusEvent {graph_id: $graph_id, entity_type: $entity_type, entity_id: $entity_id})
                     WITH e ORDER BY e.timestamp DESC, e.id DESC LIMIT 1
                     WITH e WHERE e IS NULL OR e.old_status <> $old_status OR e.new_status <> $new_status
                     CREATE (ev:StatusEvent {
                         id: $id, graph_id: $graph_id, entity_type: $entity_type, entity_id: $entity_id,
                         old_status: $old_status, new_status: $new_status, changed_by: $changed_by,
                         timestamp: $timestamp, reason: $reason
                     })
                     RETURN ev.id AS id"
                        .to_string(),
                )
                .param("id", event.id.as_str())
                .param("graph_id", event.graph_id.as_str())
                .param("entity_type", event.entity_type.as_str())
                .param("entity_id", event.entity_id.as_str())
                .param("old_status", event.old_status.as_str())
                .param("new_status", event.new_status.as_str())
                .param("changed_by", event.changed_by.as_str())
                .param("timestamp", ts(&event.timestamp))
                .param("reason", nullable(event.reason.as_deref()))
            })
            .await?;
        Ok(!rows.is_empty())
    }

    async fn event_history(
        &self,
        graph_id: &str,
        entity_type: &str,
        entity_id: &str,
        limit: usize,
    ) -> DevgraphResult<Vec<StatusEvent>> {
        let rows = self
            .rows("neo4j.event_history", || {
                Query::new(
                    "MATCH (e:StatusEvent {graph_id: $graph_id, entity_type: $entity_type, entity_id: $entity_id})
                     RETURN e.id AS id, e.graph_id AS graph_id, e.entity_type AS entity_type,
                            e.entity_id AS entity_id, e.old_status AS old_status,
                            e.new_status AS new_status, e.changed_by AS changed_by,
                            e.timestamp AS timestamp, e.reason AS reason
                     ORDER BY e.timestamp DESC, e.id DESC
                     LIMIT $limit"
                        .to_string(),
                )
                .param("graph_id", graph_id)
                .param("entity_type", entity_type)
                .param("entity_id", entity_id)
                .param("limit", limit as i64)
            })
            .await?;
        decode(rows.iter().map(event_from_row).collect())
    }

    async fn get_project(&self, id: &str) -> DevgraphResult<Option<Project>> {
        let rows = self
            .rows("neo4j.get_project", || {
                Query::new(
                    "MATCH (p:Project {id: $id})
                     RETURN p.id AS id, p.github_repo_url AS github_repo_url,
                            p.visibility AS visibility, p.owners AS owners, p.members AS members,
                            p.created_at AS created_at, p.updated_at AS updated_at"
                        .to_string(),
                )
                .param("id", id)
            })
            .await?;
        rows.first().map(|row| decode(project_from_row(row))).transpose()
    }

    async fn save_project(&self, project: &Project) -> DevgraphResult<()> {
        let owners: Vec<String> = project.owners.iter().cloned().collect();
        let members: Vec<String> = project.members.iter().cloned().collect();
        self.run("neo4j.save_project", || {
            Query::new(
                "MERGE (p:Project {id: $id})
                 SET p.github_repo_url = $github_repo_url, p.visibility = $visibility,
                     p.owners = $owners, p.members = $members,
                     p.created_at = $created_at, p.updated_at = $updated_at"
                    .to_string(),
            )
            .param("id", project.id.as_str())
            .param("github_repo_url", nullable(project.github_repo_url.as_deref()))
            .param("visibility", project.visibility.as_str())
            .param("owners", owners.clone())
            .param("members", members.clone())
            .param("created_at", ts(&project.created_at))
            .param("updated_at", ts(&project.updated_at))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_lexically() {
        let a = parse_ts("2025-11-10T09:00:00Z").unwrap();
        let b = a + chrono::Duration::microseconds(1);
        assert!(ts(&a) < ts(&b));
        assert_eq!(parse_ts(&ts(&b)).unwrap(), b);
    }

    fn query_failure(cause: neo4rs::Error) -> anyhow::Error {
        anyhow::Error::from(cause).context("Neo4j query failed")
    }

    #[test]
    fn test_io_failures_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(classify(query_failure(neo4rs::Error::from(io)), "neo4j.ping").is_transient());
        assert!(classify(query_failure(neo4rs::Error::ConnectionError), "neo4j.ping").is_transient());
    }

    #[test]
    fn test_configuration_failures_are_unavailable() {
        let auth = classify(
            query_failure(neo4rs::Error::AuthenticationError("bad credentials".into())),
            "neo4j.connect",
        );
        assert_eq!(auth.code(), "SERVICE_UNAVAILABLE");
        assert!(!auth.is_transient());
        assert_eq!(
            classify(query_failure(neo4rs::Error::InvalidConfig), "neo4j.connect").code(),
            "SERVICE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_decoding_failures_are_internal() {
        let err = classify(query_failure(neo4rs::Error::ConversionError), "neo4j.get_node");
        assert_eq!(err.code(), "INTERNAL");
        assert!(!err.is_transient());

        let err = classify(anyhow!("Failed to get field 'id'"), "neo4j.get_node");
        assert_eq!(err.code(), "INTERNAL");
    }

    #[test]
    fn test_server_status_codes() {
        let code = |status: &str| classify_status(status, "neo4j.op".to_string());

        assert_eq!(code(CONSTRAINT_VIOLATION).code(), "VALIDATION");
        assert_eq!(code("Neo.ClientError.Statement.SyntaxError").code(), "INTERNAL");
        assert!(!code("Neo.ClientError.Statement.SyntaxError").is_transient());
        assert_eq!(code("Neo.DatabaseError.General.UnknownError").code(), "INTERNAL");
        assert!(code("Neo.TransientError.General.DatabaseUnavailable").is_transient());
        assert!(code("Neo.ClientError.Cluster.NotALeader").is_transient());
        assert_eq!(code("Neo.ClientError.Security.Unauthorized").code(), "SERVICE_UNAVAILABLE");
        assert_eq!(
            code("Neo.ClientError.Database.DatabaseNotFound").code(),
            "SERVICE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_relabel_clears_every_type_label() {
        let clause = relabel(NodeType::Sprint);
        for t in NodeType::ALL {
            assert!(clause.contains(&format!(":{}", t.label())));
        }
        assert!(clause.ends_with("SET n:Sprint"));
    }

    /// Tests against a live server. Run with `cargo test -- --ignored` and
    /// `NEO4J_URI`/`NEO4J_USER`/`NEO4J_PASSWORD` pointing at a scratch database.
    mod live {
        use super::*;
        use crate::schema::initialize_schema;
        use devgraph_core::node::content_hash;

        async fn backend() -> Neo4jBackend {
            let mut config = GraphConfig::default();
            if let Ok(uri) = std::env::var("NEO4J_URI") {
                config.uri = uri;
            }
            if let Ok(user) = std::env::var("NEO4J_USER") {
                config.user = user;
            }
            if let Ok(password) = std::env::var("NEO4J_PASSWORD") {
                config.password = password;
            }
            let backend = Neo4jBackend::connect(&config, RetryPolicy::default()).await.unwrap();
            initialize_schema(backend.client(), 2).await.unwrap();
            backend
        }

        fn scratch_graph(name: &str) -> String {
            format!("it-{}-{}", name, uuid::Uuid::new_v4().simple())
        }

        fn node(graph_id: &str, id: &str, node_type: NodeType) -> Node {
            let properties: Properties =
                serde_json::from_value(serde_json::json!({ "title": id })).unwrap();
            let now = Utc::now();
            Node {
                id: id.to_string(),
                graph_id: graph_id.to_string(),
                node_type,
                content_hash: content_hash(&properties),
                properties,
                embedding: None,
                embedding_model: None,
                created_at: now,
                updated_at: now,
                edited_by: None,
                synced_at: None,
            }
        }

        async fn drop_graphs(backend: &Neo4jBackend, graphs: &[&str]) {
            let graphs: Vec<String> = graphs.iter().map(|g| g.to_string()).collect();
            backend
                .client()
                .execute(
                    Query::new(
                        "MATCH (n:KnowledgeNode) WHERE n.graph_id IN $graphs DETACH DELETE n".to_string(),
                    )
                    .param("graphs", graphs),
                )
                .await
                .unwrap();
        }

        #[tokio::test]
        #[ignore = "needs a Neo4j 5.13+ server"]
        async fn test_small_graph_found_behind_crowded_index() {
            let backend = backend().await;
            let big = scratch_graph("big");
            let small = scratch_graph("small");

            for i in 0..40 {
                let n = node(&big, &format!("TASK-{}", i), NodeType::Task);
                backend.insert_node(&n).await.unwrap();
                backend.set_embedding(&big, &n.id, &[1.0, 0.0], "it:v1").await.unwrap();
            }
            let lone = node(&small, "TASK-1", NodeType::Task);
            backend.insert_node(&lone).await.unwrap();
            backend.set_embedding(&small, "TASK-1", &[0.8, 0.6], "it:v1").await.unwrap();

            let hits = backend
                .vector_search(&small, &[1.0, 0.0], "it:v1", &[], 1)
                .await
                .unwrap();

            drop_graphs(&backend, &[&big, &small]).await;
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].node.graph_id, small);
            assert!((hits[0].similarity - 0.8).abs() < 1e-3);
        }

        #[tokio::test]
        #[ignore = "needs a Neo4j 5.13+ server"]
        async fn test_upsert_swaps_type_label_and_duplicates_are_validation() {
            let backend = backend().await;
            let graph = scratch_graph("labels");

            backend.upsert_node(&node(&graph, "X-1", NodeType::Task)).await.unwrap();
            backend.upsert_node(&node(&graph, "X-1", NodeType::Sprint)).await.unwrap();
            let rows = backend
                .client()
                .query(
                    Query::new(
                        "MATCH (n:KnowledgeNode {graph_id: $graph_id, id: 'X-1'}) RETURN labels(n) AS labels"
                            .to_string(),
                    )
                    .param("graph_id", graph.as_str()),
                )
                .await
                .unwrap();
            let mut labels: Vec<String> = rows[0].get("labels").unwrap();
            labels.sort();

            let duplicate = backend.insert_node(&node(&graph, "X-1", NodeType::Sprint)).await;

            drop_graphs(&backend, &[&graph]).await;
            assert_eq!(labels, vec!["KnowledgeNode", "Sprint"]);
            assert_eq!(duplicate.unwrap_err().code(), "VALIDATION");
        }
    }
}
