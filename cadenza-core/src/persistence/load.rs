use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value};

use cadenza_types::{
    AudioNode, CompositionId, CompositionSnapshot, KeyId, LayerId, MusicKey, NodeId, NodeType,
    Position,
};

use super::{PersistenceError, PersistenceResult};

pub(crate) fn composition_exists(conn: &Connection, cid: i64) -> PersistenceResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM compositions WHERE id = ?1",
        params![cid],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn parse_properties(node_id: i64, raw: &str) -> BTreeMap<String, f64> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        log::warn!(target: "core::persistence", "node {}: unreadable properties ({}), using defaults", node_id, e);
        BTreeMap::new()
    })
}

/// Read one node row. A row whose type is no longer in the catalog reads as
/// missing.
pub(crate) fn read_node(conn: &Connection, cid: i64, id: NodeId) -> PersistenceResult<Option<AudioNode>> {
    let row = conn
        .query_row(
            "SELECT node_type, label, x, y, properties FROM audio_nodes
             WHERE composition_id = ?1 AND id = ?2",
            params![cid, id.get() as i64],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((node_type, label, x, y, properties)) = row else {
        return Ok(None);
    };
    let Some(node_type) = NodeType::parse(&node_type) else {
        log::warn!(target: "core::persistence", "node {}: unknown type '{}'", id, node_type);
        return Ok(None);
    };
    Ok(Some(AudioNode {
        id,
        node_type,
        label,
        position: Position::new(x, y),
        properties: parse_properties(id.get() as i64, &properties),
    }))
}

pub(crate) fn read_key(conn: &Connection, cid: i64, id: KeyId) -> PersistenceResult<Option<MusicKey>> {
    let row = conn
        .query_row(
            "SELECT layer_id, instrument_id, note, time, duration, velocity FROM music_keys
             WHERE composition_id = ?1 AND id = ?2",
            params![cid, id.get() as i64],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((layer_id, instrument_id, note, time, duration, velocity)) = row else {
        return Ok(None);
    };
    let Ok(note) = u8::try_from(note) else {
        log::warn!(target: "core::persistence", "key {}: note {} out of range", id, note);
        return Ok(None);
    };
    Ok(Some(MusicKey {
        id,
        layer_id: LayerId::new(layer_id as u64),
        instrument_id: NodeId::new(instrument_id as u64),
        note,
        time,
        duration,
        velocity,
    }))
}

/// Read a composition as raw snapshot records. Validation happens later,
/// when the snapshot is loaded into a store.
pub fn load_snapshot(conn: &Connection, composition_id: CompositionId) -> PersistenceResult<CompositionSnapshot> {
    let cid = composition_id.get() as i64;
    let meta = conn
        .query_row(
            "SELECT name, description, bpm FROM compositions WHERE id = ?1",
            params![cid],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?)),
        )
        .optional()?;
    let Some((name, description, bpm)) = meta else {
        return Err(PersistenceError::NotFound(composition_id));
    };

    Ok(CompositionSnapshot {
        name,
        description,
        bpm: Some(bpm),
        nodes: load_nodes(conn, cid)?,
        edges: load_edges(conn, cid)?,
        layers: load_layers(conn, cid)?,
        keys: load_keys(conn, cid)?,
    })
}

fn load_nodes(conn: &Connection, cid: i64) -> PersistenceResult<BTreeMap<String, Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, node_type, label, x, y, properties FROM audio_nodes
         WHERE composition_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![cid], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut nodes = BTreeMap::new();
    for row in rows {
        let (id, node_type, label, x, y, properties) = row?;
        // kept loose: the snapshot loader drops bad values per property
        let properties: Value = serde_json::from_str(&properties).unwrap_or_else(|e| {
            log::warn!(target: "core::persistence", "node {}: unreadable properties ({})", id, e);
            json!({})
        });
        nodes.insert(
            id.to_string(),
            json!({
                "id": id,
                "type": node_type,
                "label": label,
                "position": { "x": x, "y": y },
                "properties": properties,
            }),
        );
    }
    Ok(nodes)
}

fn load_edges(conn: &Connection, cid: i64) -> PersistenceResult<BTreeMap<String, Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_node, source_socket, target_node, target_socket FROM audio_edges
         WHERE composition_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![cid], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
        ))
    })?;

    let mut edges = BTreeMap::new();
    for row in rows {
        let (id, source_node, source_socket, target_node, target_socket) = row?;
        edges.insert(
            id.to_string(),
            json!({
                "id": id,
                "source": { "node_id": source_node, "socket": source_socket },
                "target": { "node_id": target_node, "socket": target_socket },
            }),
        );
    }
    Ok(edges)
}

fn load_layers(conn: &Connection, cid: i64) -> PersistenceResult<BTreeMap<String, Value>> {
    let mut stmt = conn.prepare("SELECT id, name FROM music_layers WHERE composition_id = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![cid], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

    let mut layers = BTreeMap::new();
    for row in rows {
        let (id, name) = row?;
        layers.insert(id.to_string(), json!({ "id": id, "name": name }));
    }
    Ok(layers)
}

fn load_keys(conn: &Connection, cid: i64) -> PersistenceResult<BTreeMap<String, Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, layer_id, instrument_id, note, time, duration, velocity FROM music_keys
         WHERE composition_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![cid], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, f64>(5)?,
            row.get::<_, f64>(6)?,
        ))
    })?;

    let mut keys = BTreeMap::new();
    for row in rows {
        let (id, layer_id, instrument_id, note, time, duration, velocity) = row?;
        keys.insert(
            id.to_string(),
            json!({
                "id": id,
                "layer_id": layer_id,
                "instrument_id": instrument_id,
                "note": note,
                "time": time,
                "duration": duration,
                "velocity": velocity,
            }),
        );
    }
    Ok(keys)
}
