//! Search engine: owned criteria plus search execution.
//!
//! Criteria changes are synchronous and local. Each search takes a snapshot
//! of the criteria when it is issued, so later changes (or a second search)
//! never affect a request that is already in flight.

use std::collections::BTreeSet;
use std::time::Duration;

use bmlt_protocol::{
    BmltError, BmltResult, DimensionKind, FormatNode, MeetingId, MeetingNode, Operation,
    Publication, ResultExtent, SearchCriteria, SearchDimension, decode_formats, decode_meetings,
};
use bmlt_transport::{Credential, Gateway, GatewayRequest};
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::ReferenceCache;

/// Decoded answer of one search
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SearchOutcome {
    pub(crate) meetings: Vec<MeetingNode>,
    pub(crate) formats: Option<Vec<FormatNode>>,
}

/// Owns the session's search criteria
#[derive(Debug, Default)]
pub(crate) struct SearchEngine {
    criteria: Mutex<SearchCriteria>,
}

impl SearchEngine {
    pub(crate) fn set_criterion(&self, dimension: SearchDimension) {
        debug!(dimension = ?dimension.kind(), "Search criterion set");
        self.criteria.lock().set(dimension);
    }

    pub(crate) fn unset_criterion(&self, kind: DimensionKind) {
        self.criteria.lock().unset(kind);
    }

    pub(crate) fn clear_criteria(&self) {
        debug!("Search criteria cleared");
        self.criteria.lock().clear();
    }

    /// Copy of the current criteria
    pub(crate) fn snapshot(&self) -> SearchCriteria {
        self.criteria.lock().clone()
    }
}

/// Runs one search against the gateway
#[derive(Debug)]
pub(crate) struct SearchRequest<'a> {
    pub(crate) gateway: &'a dyn Gateway,
    pub(crate) cache: &'a ReferenceCache,
    pub(crate) credential: Option<Credential>,
    pub(crate) timeout: Option<Duration>,
}

impl SearchRequest<'_> {
    /// Execute `criteria` and decode what `extent` asks for
    pub(crate) async fn execute(
        &self,
        criteria: &SearchCriteria,
        extent: ResultExtent,
    ) -> BmltResult<SearchOutcome> {
        let admin = self.credential.is_some();
        let params = criteria.to_params(self.cache.server_info().distance_units, extent, admin);
        debug!(params = params.len(), ?extent, "Executing search");

        let value = self
            .gateway
            .request(
                GatewayRequest::new(Operation::Search, params)
                    .with_credential(self.credential.clone())
                    .with_timeout(self.timeout),
            )
            .await
            .map_err(BmltError::from)?
            .into_json()
            .map_err(BmltError::from)?;

        let meetings = match extent {
            ResultExtent::FormatsOnly => Vec::new(),
            _ => decode_meetings(&value, self.cache.available_keys(), self.cache)?,
        };
        let formats = match extent {
            ResultExtent::MeetingsOnly => None,
            _ => Some(decode_formats(&value)?),
        };
        debug!(meetings = meetings.len(), "Search decoded");
        Ok(SearchOutcome { meetings, formats })
    }

    /// Look up one meeting by id, published or not when logged in
    pub(crate) async fn fetch_meeting(&self, id: MeetingId) -> BmltResult<MeetingNode> {
        let mut criteria =
            SearchCriteria::new().with(SearchDimension::MeetingIds(BTreeSet::from([id])));
        if self.credential.is_some() {
            criteria.set(SearchDimension::Publication(Publication::Both));
        }
        self.execute(&criteria, ResultExtent::MeetingsOnly)
            .await?
            .meetings
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| BmltError::not_found(format!("meeting {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmlt_protocol::{IdFilter, Weekday};

    #[test]
    fn snapshot_is_detached() {
        let engine = SearchEngine::default();
        engine.set_criterion(SearchDimension::Weekdays(IdFilter::including([Weekday::Monday])));
        let snapshot = engine.snapshot();

        engine.clear_criteria();
        assert!(engine.snapshot().is_empty());
        assert_eq!(snapshot.weekdays().include.len(), 1);
    }

    #[test]
    fn unset_removes_one_dimension() {
        let engine = SearchEngine::default();
        engine.set_criterion(SearchDimension::Weekdays(IdFilter::including([Weekday::Friday])));
        engine.set_criterion(SearchDimension::MinDuration(30));
        engine.unset_criterion(DimensionKind::Weekdays);
        let snapshot = engine.snapshot();
        assert!(snapshot.weekdays().is_empty());
        assert!(!snapshot.is_empty());
    }
}
