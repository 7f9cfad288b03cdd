//! CorrectionRecorder: validate, persist, then mine.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  correction::{CorrectionEvent, CorrectionRequest},
  miner::{MiningReport, PatternMiner},
  store::{PatternStore, StoreResultExt as _},
};

pub struct CorrectionRecorder<S> {
  store: Arc<S>,
  miner: PatternMiner<S>,
}

impl<S: PatternStore> CorrectionRecorder<S> {
  pub fn new(store: Arc<S>, miner: PatternMiner<S>) -> Self {
    Self { store, miner }
  }

  /// Record one correction and return its event id.
  ///
  /// Not idempotent: every call is a distinct correction.
  pub async fn record_correction(&self, request: CorrectionRequest) -> Result<Uuid> {
    self.record(request).await.map(|(event, _)| event.event_id)
  }

  /// As [`record_correction`](Self::record_correction), also returning the
  /// persisted event and what mining did.
  ///
  /// Validation failures write nothing. A mining failure leaves the event in
  /// place and is reported as [`Error::MiningFailed`].
  pub async fn record(
    &self,
    request: CorrectionRequest,
  ) -> Result<(CorrectionEvent, MiningReport)> {
    let input = request.validate()?;
    let event = self.store.append_correction(input).await.into_core()?;

    info!(
      event_id = %event.event_id,
      tenant_id = %event.tenant_id,
      entity_type = %event.entity_type,
      field = %event.field,
      "correction recorded"
    );

    match self.miner.mine(&event).await {
      Ok(report) => Ok((event, report)),
      Err(e) => {
        warn!(event_id = %event.event_id, error = %e, "mining failed after correction was recorded");
        Err(Error::MiningFailed {
          event_id: event.event_id,
          source:   Box::new(e),
        })
      }
    }
  }
}
