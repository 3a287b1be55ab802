//! Maps core results onto what the command line prints and the status it
//! exits with. Declined, failed, partially applied and unaudited commits each
//! get their own status so scripts can tell them apart.

use agent_mesh_core::ledger::LedgerEntry;
use agent_mesh_core::memory::{MemoryRead, MemoryWrite};
use agent_mesh_core::shadow::{CommitError, CommitOutcome, Declined, ShadowState};
use agent_mesh_core::{MeshError, ProviderError};
use serde_json::{json, Value};

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
pub const EXIT_APPROVAL_REQUIRED: u8 = 3;
pub const EXIT_NOTHING_TO_COMMIT: u8 = 4;
pub const EXIT_PARTIAL_COMMIT: u8 = 5;
pub const EXIT_CONFLICT: u8 = 6;
pub const EXIT_COMMIT_UNAUDITED: u8 = 7;

#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub status: u8,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: EXIT_OK,
            body,
        }
    }

    pub fn failed(err: &MeshError) -> Self {
        let mut body = json!({ "status": "failed", "error": err.to_string() });
        if let MeshError::Provider(provider) = err {
            body["provider"] = provider_json(provider);
        }
        Self {
            status: EXIT_FAILED,
            body,
        }
    }
}

fn provider_json(err: &ProviderError) -> Value {
    json!({ "status": err.status, "code": err.code, "message": err.message })
}

/// Memory reads never fail the command; a failed read still prints the
/// empty mapping the caller should proceed with.
pub fn memory_read(read: MemoryRead) -> Reply {
    match read {
        MemoryRead::Found { record, revision } => Reply::ok(json!({
            "state": "found",
            "memory": record,
            "revision": revision.as_str(),
        })),
        MemoryRead::Absent => Reply::ok(json!({ "state": "absent", "memory": {} })),
        MemoryRead::Failed(fault) => Reply::ok(json!({
            "state": "failed",
            "memory": {},
            "error": fault.to_string(),
        })),
    }
}

pub fn memory_write(write: MemoryWrite) -> Reply {
    match write {
        MemoryWrite::Created { revision } => Reply::ok(json!({
            "status": "created",
            "revision": revision.as_str(),
        })),
        MemoryWrite::Replaced { revision } => Reply::ok(json!({
            "status": "updated",
            "revision": revision.as_str(),
        })),
        MemoryWrite::Conflict { current } => Reply {
            status: EXIT_CONFLICT,
            body: json!({
                "status": "conflict",
                "current_revision": current.as_ref().map(|r| r.as_str()),
            }),
        },
        MemoryWrite::Failed(fault) => Reply::ok(json!({
            "status": "failed",
            "error": fault.to_string(),
        })),
    }
}

fn entry_json(entry: &LedgerEntry) -> Value {
    json!({
        "timestamp": entry.timestamp,
        "action": entry.action,
        "prompt": entry.prompt,
        "model": entry.model,
        "reasoning": entry.reasoning,
    })
}

pub fn logged(result: Result<LedgerEntry, MeshError>) -> Reply {
    match result {
        Ok(entry) => Reply::ok(json!({ "status": "logged", "entry": entry_json(&entry) })),
        Err(err) => Reply::failed(&err),
    }
}

pub fn history(result: Result<Vec<LedgerEntry>, MeshError>) -> Reply {
    match result {
        Ok(entries) => Reply::ok(json!({
            "entries": entries.iter().map(entry_json).collect::<Vec<_>>(),
        })),
        Err(err) => Reply::failed(&err),
    }
}

pub fn handed_off(result: Result<MemoryWrite, MeshError>) -> Reply {
    match result {
        Ok(write) => {
            let mut reply = memory_write(write);
            reply.body["handed_off"] = Value::Bool(reply.status == EXIT_OK);
            reply
        }
        Err(err) => Reply::failed(&err),
    }
}

pub fn staged(result: Result<String, MeshError>) -> Reply {
    match result {
        Ok(shadow_id) => Reply::ok(json!({ "shadow_folder_id": shadow_id })),
        Err(err) => Reply::failed(&err),
    }
}

pub fn shadow_state(result: Result<ShadowState, MeshError>) -> Reply {
    match result {
        Ok(ShadowState::NoShadow) => Reply::ok(json!({ "state": "no_shadow" })),
        Ok(ShadowState::Staged { shadow_id, files }) => Reply::ok(json!({
            "state": "staged",
            "shadow_folder_id": shadow_id,
            "files": files.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
        })),
        Err(err) => Reply::failed(&err),
    }
}

pub fn committed(result: Result<CommitOutcome, MeshError>) -> Reply {
    match result {
        Ok(CommitOutcome::Committed(report)) => Reply::ok(json!({
            "status": "committed",
            "replaced": report.replaced,
            "added": report.added,
            "skipped": report.skipped,
        })),
        Ok(CommitOutcome::Declined(reason)) => {
            let status = match reason {
                Declined::ApprovalRequired => EXIT_APPROVAL_REQUIRED,
                Declined::NoShadow => EXIT_NOTHING_TO_COMMIT,
            };
            Reply {
                status,
                body: json!({
                    "status": "declined",
                    "reason": reason,
                    "message": reason.message(),
                }),
            }
        }
        Err(MeshError::Commit(CommitError::Partial {
            merged,
            pending,
            source,
        })) => Reply {
            status: EXIT_PARTIAL_COMMIT,
            body: json!({
                "status": "partial",
                "merged": merged,
                "still_staged": pending,
                "error": source.to_string(),
                "provider": provider_json(&source),
            }),
        },
        Err(MeshError::CommitUnaudited { report, source }) => {
            let mut body = json!({
                "status": "unaudited",
                "replaced": report.replaced,
                "added": report.added,
                "skipped": report.skipped,
                "error": source.to_string(),
            });
            if let MeshError::Provider(provider) = source.as_ref() {
                body["provider"] = provider_json(provider);
            }
            Reply {
                status: EXIT_COMMIT_UNAUDITED,
                body,
            }
        }
        Err(MeshError::Commit(CommitError::Failed(source))) => Reply {
            status: EXIT_FAILED,
            body: json!({
                "status": "failed",
                "error": source.to_string(),
                "provider": provider_json(&source),
            }),
        },
        Err(err) => Reply::failed(&err),
    }
}
