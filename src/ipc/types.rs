use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::assemble::PayloadKind;
use crate::catalog::Catalog;
use crate::pool::{SelectionContext, StudentPool};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// One in-progress invoice/remit assembly. Drafts are transient: they live
/// in memory until submitted or the daemon exits; only submitted documents
/// persist.
pub struct Draft {
    pub kind: PayloadKind,
    pub relation_id: String,
    pub year_label: String,
    pub session_name: String,
    pub semester: Option<String>,
    /// Pricing context captured at draft creation; used when the relation
    /// can no longer be resolved against the current catalog snapshot.
    pub fallback_ctx: SelectionContext,
    /// For edit drafts, the persisted document being revised.
    pub document_id: Option<String>,
    pub pool: StudentPool,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub catalog: Catalog,
    pub drafts: HashMap<String, Draft>,
}

impl AppState {
    pub fn new() -> AppState {
        AppState {
            workspace: None,
            db: None,
            catalog: Catalog::default(),
            drafts: HashMap::new(),
        }
    }
}
