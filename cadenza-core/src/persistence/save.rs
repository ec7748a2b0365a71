use rusqlite::{params, Connection};

use cadenza_types::summary::EdgePending;
use cadenza_types::{
    AudioEdge, AudioNode, ChangeSummary, CompositionId, CompositionMeta, EdgeId, KeyId,
    KeyPatch, LayerId, LayerPatch, MetadataPatch, MusicKey, MusicLayer, NodeId, NodePatch,
    Pending,
};

use super::load::{composition_exists, read_key, read_node};
use super::{PersistenceError, PersistenceResult};

pub fn insert_composition(conn: &Connection, meta: &CompositionMeta) -> PersistenceResult<CompositionId> {
    conn.execute(
        "INSERT INTO compositions (name, description, bpm, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))",
        params![meta.name, meta.description, meta.bpm],
    )?;
    Ok(CompositionId::new(conn.last_insert_rowid() as u64))
}

/// Apply every pending operation of `summary`. The caller owns the transaction.
pub fn apply_summary(
    conn: &Connection,
    composition_id: CompositionId,
    summary: &ChangeSummary,
) -> PersistenceResult {
    let cid = composition_id.get() as i64;
    if !composition_exists(conn, cid)? {
        return Err(PersistenceError::NotFound(composition_id));
    }

    if let Some(patch) = &summary.metadata {
        save_metadata(conn, cid, patch)?;
    }
    for (id, pending) in &summary.nodes {
        save_node(conn, cid, *id, pending)?;
    }
    for (id, pending) in &summary.edges {
        save_edge(conn, cid, *id, pending)?;
    }
    for (id, pending) in &summary.layers {
        save_layer(conn, cid, *id, pending)?;
    }
    for (id, pending) in &summary.keys {
        save_key(conn, cid, *id, pending)?;
    }

    conn.execute(
        "UPDATE compositions SET updated_at = datetime('now') WHERE id = ?1",
        params![cid],
    )?;
    Ok(())
}

// ============================================================
// Metadata
// ============================================================

fn save_metadata(conn: &Connection, cid: i64, patch: &MetadataPatch) -> PersistenceResult {
    conn.execute(
        "UPDATE compositions SET
            name = COALESCE(?1, name),
            description = COALESCE(?2, description),
            bpm = COALESCE(?3, bpm)
         WHERE id = ?4",
        params![patch.name, patch.description, patch.bpm, cid],
    )?;
    Ok(())
}

// ============================================================
// Nodes
// ============================================================

fn write_node(conn: &Connection, cid: i64, node: &AudioNode) -> PersistenceResult {
    let properties = serde_json::to_string(&node.properties)?;
    conn.execute(
        "INSERT OR REPLACE INTO audio_nodes (composition_id, id, node_type, label, x, y, properties)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            cid,
            node.id.get() as i64,
            node.node_type.as_str(),
            node.label,
            node.position.x,
            node.position.y,
            properties,
        ],
    )?;
    Ok(())
}

fn save_node(
    conn: &Connection,
    cid: i64,
    id: NodeId,
    pending: &Pending<AudioNode, NodePatch>,
) -> PersistenceResult {
    match pending {
        Pending::Create(node) => write_node(conn, cid, node),
        Pending::Update(patch) => match read_node(conn, cid, id)? {
            // properties merge per key onto the stored map
            Some(mut node) => {
                node.apply(patch);
                write_node(conn, cid, &node)
            }
            None => {
                log::debug!(target: "core::persistence", "update of missing node {} ignored", id);
                Ok(())
            }
        },
        Pending::Remove => {
            conn.execute(
                "DELETE FROM audio_nodes WHERE composition_id = ?1 AND id = ?2",
                params![cid, id.get() as i64],
            )?;
            Ok(())
        }
    }
}

// ============================================================
// Edges
// ============================================================

fn write_edge(conn: &Connection, cid: i64, edge: &AudioEdge) -> PersistenceResult {
    conn.execute(
        "INSERT OR REPLACE INTO audio_edges
            (composition_id, id, source_node, source_socket, target_node, target_socket)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            cid,
            edge.id.get() as i64,
            edge.source.node_id.get() as i64,
            edge.source.socket,
            edge.target.node_id.get() as i64,
            edge.target.socket,
        ],
    )?;
    Ok(())
}

fn save_edge(conn: &Connection, cid: i64, id: EdgeId, pending: &EdgePending) -> PersistenceResult {
    match pending {
        EdgePending::Create(edge) => write_edge(conn, cid, edge),
        EdgePending::Remove => {
            conn.execute(
                "DELETE FROM audio_edges WHERE composition_id = ?1 AND id = ?2",
                params![cid, id.get() as i64],
            )?;
            Ok(())
        }
    }
}

// ============================================================
// Layers
// ============================================================

fn save_layer(
    conn: &Connection,
    cid: i64,
    id: LayerId,
    pending: &Pending<MusicLayer, LayerPatch>,
) -> PersistenceResult {
    match pending {
        Pending::Create(layer) => {
            conn.execute(
                "INSERT OR REPLACE INTO music_layers (composition_id, id, name) VALUES (?1, ?2, ?3)",
                params![cid, layer.id.get() as i64, layer.name],
            )?;
        }
        Pending::Update(patch) => {
            if let Some(name) = &patch.name {
                conn.execute(
                    "UPDATE music_layers SET name = ?1 WHERE composition_id = ?2 AND id = ?3",
                    params![name, cid, id.get() as i64],
                )?;
            }
        }
        Pending::Remove => {
            conn.execute(
                "DELETE FROM music_layers WHERE composition_id = ?1 AND id = ?2",
                params![cid, id.get() as i64],
            )?;
        }
    }
    Ok(())
}

// ============================================================
// Keys
// ============================================================

fn write_key(conn: &Connection, cid: i64, key: &MusicKey) -> PersistenceResult {
    conn.execute(
        "INSERT OR REPLACE INTO music_keys
            (composition_id, id, layer_id, instrument_id, note, time, duration, velocity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            cid,
            key.id.get() as i64,
            key.layer_id.get() as i64,
            key.instrument_id.get() as i64,
            key.note,
            key.time,
            key.duration,
            key.velocity,
        ],
    )?;
    Ok(())
}

fn save_key(
    conn: &Connection,
    cid: i64,
    id: KeyId,
    pending: &Pending<MusicKey, KeyPatch>,
) -> PersistenceResult {
    match pending {
        Pending::Create(key) => write_key(conn, cid, key),
        Pending::Update(patch) => match read_key(conn, cid, id)? {
            Some(mut key) => {
                key.apply(patch);
                write_key(conn, cid, &key)
            }
            None => {
                log::debug!(target: "core::persistence", "update of missing key {} ignored", id);
                Ok(())
            }
        },
        Pending::Remove => {
            conn.execute(
                "DELETE FROM music_keys WHERE composition_id = ?1 AND id = ?2",
                params![cid, id.get() as i64],
            )?;
            Ok(())
        }
    }
}
