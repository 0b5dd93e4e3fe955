// crates/laminark-server/src/db/schema.rs
// SQL for the versioned migrations. Append-only: released entries never change.

/// v1 -- observations, external-content FTS5 index, sessions, project metadata.
///
/// The explicit AUTOINCREMENT rowid is load-bearing: the FTS table pivots on
/// it and rowids must never be reused across compaction.
pub const V1_CORE: &str = r#"
CREATE TABLE IF NOT EXISTS observations (
    rowid INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT UNIQUE NOT NULL,
    project_hash TEXT NOT NULL,
    content TEXT NOT NULL,
    title TEXT,
    source TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'finding'
        CHECK(kind IN ('finding','change','verification','reference')),
    session_id TEXT,
    embedding BLOB,
    embedding_model TEXT,
    embedding_version INTEGER,
    classification TEXT,
    classified_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_observations_project ON observations(project_hash);
CREATE INDEX IF NOT EXISTS idx_observations_session ON observations(session_id);
CREATE INDEX IF NOT EXISTS idx_observations_created ON observations(created_at);
CREATE INDEX IF NOT EXISTS idx_observations_deleted ON observations(deleted_at)
    WHERE deleted_at IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_observations_classification ON observations(classification);

CREATE VIRTUAL TABLE IF NOT EXISTS observations_fts USING fts5(
    title,
    content,
    content='observations',
    content_rowid='rowid',
    tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS observations_fts_insert AFTER INSERT ON observations BEGIN
    INSERT INTO observations_fts(rowid, title, content)
    VALUES (new.rowid, new.title, new.content);
END;
CREATE TRIGGER IF NOT EXISTS observations_fts_delete AFTER DELETE ON observations BEGIN
    INSERT INTO observations_fts(observations_fts, rowid, title, content)
    VALUES ('delete', old.rowid, old.title, old.content);
END;
CREATE TRIGGER IF NOT EXISTS observations_fts_update AFTER UPDATE ON observations BEGIN
    INSERT INTO observations_fts(observations_fts, rowid, title, content)
    VALUES ('delete', old.rowid, old.title, old.content);
    INSERT INTO observations_fts(rowid, title, content)
    VALUES (new.rowid, new.title, new.content);
END;

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    project_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    summary TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_hash, started_at DESC);

CREATE TABLE IF NOT EXISTS project_metadata (
    project_hash TEXT PRIMARY KEY,
    project_path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// v2 -- topic tracking: stashes, threshold history, shift-decision audit.
pub const V2_TOPIC: &str = r#"
CREATE TABLE IF NOT EXISTS context_stashes (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    session_id TEXT,
    topic_label TEXT NOT NULL,
    summary TEXT,
    observations TEXT NOT NULL DEFAULT '[]',
    observation_ids TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'stashed'
        CHECK(status IN ('stashed','resumed','expired')),
    created_at TEXT NOT NULL,
    resumed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_stashes_project ON context_stashes(project_id, created_at DESC);

CREATE TABLE IF NOT EXISTS threshold_history (
    id INTEGER PRIMARY KEY,
    project_hash TEXT NOT NULL,
    session_id TEXT,
    mean REAL NOT NULL,
    variance REAL NOT NULL,
    observation_count INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_threshold_project ON threshold_history(project_hash, created_at DESC);

CREATE TABLE IF NOT EXISTS shift_decisions (
    id INTEGER PRIMARY KEY,
    project_hash TEXT NOT NULL,
    observation_id TEXT,
    distance REAL NOT NULL,
    threshold REAL NOT NULL,
    ewma_mean REAL,
    ewma_variance REAL,
    sensitivity REAL,
    shifted INTEGER NOT NULL DEFAULT 0,
    confidence REAL NOT NULL DEFAULT 0,
    stash_id TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_shift_decisions_project
    ON shift_decisions(project_hash, created_at DESC);
"#;

/// v3 -- typed knowledge graph with closed taxonomies.
pub const V3_GRAPH: &str = r#"
CREATE TABLE IF NOT EXISTS graph_nodes (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL
        CHECK(type IN ('Project','File','Decision','Problem','Solution','Reference')),
    name TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    observation_ids TEXT NOT NULL DEFAULT '[]',
    project_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(name, type, project_hash)
);
CREATE INDEX IF NOT EXISTS idx_graph_nodes_project ON graph_nodes(project_hash);
CREATE INDEX IF NOT EXISTS idx_graph_nodes_name ON graph_nodes(name);

CREATE TABLE IF NOT EXISTS graph_edges (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
    type TEXT NOT NULL
        CHECK(type IN ('related_to','solved_by','caused_by','modifies',
                       'informed_by','references','verified_by','preceded_by')),
    weight REAL NOT NULL DEFAULT 0.5 CHECK(weight >= 0.0 AND weight <= 1.0),
    metadata TEXT NOT NULL DEFAULT '{}',
    project_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(source_id, target_id, type)
);
CREATE INDEX IF NOT EXISTS idx_graph_edges_source ON graph_edges(source_id);
CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges(target_id);
CREATE INDEX IF NOT EXISTS idx_graph_edges_project ON graph_edges(project_hash);
"#;

/// v4 -- debug paths and their ordered waypoints.
pub const V4_DEBUG: &str = r#"
CREATE TABLE IF NOT EXISTS debug_paths (
    id TEXT PRIMARY KEY,
    project_hash TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
        CHECK(status IN ('active','resolved','abandoned')),
    started_at TEXT NOT NULL,
    resolved_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_debug_paths_project ON debug_paths(project_hash, status);

CREATE TABLE IF NOT EXISTS path_waypoints (
    id TEXT PRIMARY KEY,
    path_id TEXT NOT NULL REFERENCES debug_paths(id) ON DELETE CASCADE,
    sequence_order INTEGER NOT NULL,
    type TEXT NOT NULL
        CHECK(type IN ('error','attempt','failure','success',
                       'pivot','revert','discovery','resolution')),
    content TEXT NOT NULL,
    observation_id TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(path_id, sequence_order)
);
CREATE INDEX IF NOT EXISTS idx_waypoints_path ON path_waypoints(path_id, sequence_order);
"#;

/// v5 -- transient buffers: research provenance and the notification queue.
pub const V5_BUFFERS: &str = r#"
CREATE TABLE IF NOT EXISTS research_buffer (
    id INTEGER PRIMARY KEY,
    project_hash TEXT NOT NULL,
    session_id TEXT,
    tool_name TEXT NOT NULL,
    target TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_research_project ON research_buffer(project_hash, created_at);

CREATE TABLE IF NOT EXISTS pending_notifications (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notifications_project
    ON pending_notifications(project_id, created_at);
"#;

/// v6 -- tool registry and per-invocation usage events.
pub const V6_TOOLS: &str = r#"
CREATE TABLE IF NOT EXISTS tool_registry (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    tool_type TEXT NOT NULL,
    scope TEXT NOT NULL DEFAULT 'global' CHECK(scope IN ('global','project','plugin')),
    source TEXT,
    project_hash TEXT,
    description TEXT,
    server_name TEXT,
    usage_count INTEGER NOT NULL DEFAULT 0,
    last_used_at TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','stale','demoted')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tool_registry_name
    ON tool_registry(name, COALESCE(project_hash, ''));

CREATE TABLE IF NOT EXISTS tool_usage_events (
    id INTEGER PRIMARY KEY,
    tool_name TEXT NOT NULL,
    project_hash TEXT,
    session_id TEXT,
    success INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tool_usage_name ON tool_usage_events(tool_name, created_at);
"#;

/// v7 -- advisory staleness flags written by curation, never read by search.
pub const V7_STALENESS: &str = r#"
CREATE TABLE IF NOT EXISTS staleness_flags (
    node_id TEXT NOT NULL,
    observation_id TEXT NOT NULL,
    superseded_by TEXT,
    reason TEXT,
    project_hash TEXT NOT NULL,
    flagged_at TEXT NOT NULL,
    PRIMARY KEY (node_id, observation_id)
);
CREATE INDEX IF NOT EXISTS idx_staleness_project ON staleness_flags(project_hash);
"#;

/// v8 -- cosine-distance vector index (only applied when vec0 is loadable).
pub const V8_VECTORS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS observation_embeddings USING vec0(
    observation_id TEXT PRIMARY KEY,
    embedding float[384] distance_metric=cosine
);
"#;

/// v9 -- keyword index over the tool registry.
pub const V9_TOOL_FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS tool_registry_fts USING fts5(
    name,
    description,
    content='tool_registry',
    content_rowid='id',
    tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS tool_registry_fts_insert AFTER INSERT ON tool_registry BEGIN
    INSERT INTO tool_registry_fts(rowid, name, description)
    VALUES (new.id, new.name, new.description);
END;
CREATE TRIGGER IF NOT EXISTS tool_registry_fts_delete AFTER DELETE ON tool_registry BEGIN
    INSERT INTO tool_registry_fts(tool_registry_fts, rowid, name, description)
    VALUES ('delete', old.id, old.name, old.description);
END;
CREATE TRIGGER IF NOT EXISTS tool_registry_fts_update AFTER UPDATE ON tool_registry BEGIN
    INSERT INTO tool_registry_fts(tool_registry_fts, rowid, name, description)
    VALUES ('delete', old.id, old.name, old.description);
    INSERT INTO tool_registry_fts(rowid, name, description)
    VALUES (new.id, new.name, new.description);
END;
"#;
