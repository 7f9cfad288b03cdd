//! Tests for `SqliteStore` against an in-memory database: the store
//! contract on its own, then the learning engine running on top of it,
//! including against a wrapper that makes chosen writes fail.


use amend_core::correction::{CorrectionRequest, EntityData};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn category_fix(tenant_id: Uuid, merchant: &str, category: &str) -> CorrectionRequest {
  CorrectionRequest {
    tenant_id,
    entity_type: "expense".into(),
    entity_id: Uuid::new_v4().to_string(),
    field: "category".into(),
    original_value: Some("Uncategorized".into()),
    corrected_value: category.into(),
    actor_id: "user-1".into(),
    context: EntityData::default().with_merchant(merchant),
  }
}
