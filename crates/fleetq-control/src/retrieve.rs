//! Generic object retrieval.
//!
//! One engine serves every collection. Search groups are sent as one
//! filtered request each and unioned; collections with known server
//! defects get rewritten requests or a client-side filter. A cardinality
//! check runs once over the final result.

use std::fmt;

use fleetq_core::{ObjectId, ObjectKind, Record, RetrievalDefects, SearchGroup, SearchSpec};
use fleetq_transport::{CacheFilter, FetchRequest, FetchTarget, Transport};

use crate::error::{ControlError, Result};
use crate::types::{Limits, RetrieveOptions};

/// Objects returned by a retrieval.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieved<R> {
    /// An "exactly 1" limit collapsed the result to its only element.
    Single(R),
    /// Every matching object.
    List(Vec<R>),
}

impl<R> Retrieved<R> {
    /// Every object, whether collapsed or not.
    #[must_use]
    pub fn into_vec(self) -> Vec<R> {
        match self {
            Self::Single(item) => vec![item],
            Self::List(items) => items,
        }
    }

    /// The single object, if there is exactly one.
    #[must_use]
    pub fn into_single(self) -> Option<R> {
        match self {
            Self::Single(item) => Some(item),
            Self::List(mut items) if items.len() == 1 => items.pop(),
            Self::List(_) => None,
        }
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::List(items) => items.len(),
        }
    }

    /// True when nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
enum Comparison {
    AtLeast,
    AtMost,
    Exactly,
}

impl Comparison {
    const fn holds(self, len: usize, bound: usize) -> bool {
        match self {
            Self::AtLeast => len >= bound,
            Self::AtMost => len <= bound,
            Self::Exactly => len == bound,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::AtLeast => "limit_min",
            Self::AtMost => "limit_max",
            Self::Exactly => "limit_exact",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AtLeast => "or more",
            Self::AtMost => "or less",
            Self::Exactly => "exactly",
        };
        f.write_str(text)
    }
}

/// Apply cardinality limits to a retrieval result.
///
/// Limits are evaluated as min, max, exact. On success an exact limit of 1
/// collapses the result to its only element.
///
/// # Errors
///
/// Returns `ControlError::CheckLimit` with the outcome of every limit and
/// the offending objects if any limit fails.
pub fn check_limits<R: Record>(items: Vec<R>, limits: &Limits) -> Result<Retrieved<R>> {
    let len = items.len();
    let checks = [
        (Comparison::AtLeast, limits.min),
        (Comparison::AtMost, limits.max),
        (Comparison::Exactly, limits.exact),
    ];

    let mut failed = false;
    let mut outcomes = Vec::with_capacity(checks.len());
    for (comparison, bound) in checks {
        let label = comparison.label();
        let outcome = match (comparison, bound) {
            (_, None) => format!("'{label}' SKIPPED"),
            (Comparison::Exactly, Some(n)) => {
                let verdict = if comparison.holds(len, n) { "PASSED" } else { "FAILED" };
                failed |= !comparison.holds(len, n);
                format!("'{label}' {verdict} (must be exactly {n} items)")
            }
            (_, Some(n)) => {
                let verdict = if comparison.holds(len, n) { "PASSED" } else { "FAILED" };
                failed |= !comparison.holds(len, n);
                format!("'{label}' {verdict} (must be {n} items {comparison})")
            }
        };
        outcomes.push(outcome);
    }

    if failed {
        let report = outcomes.join("; ");
        let listed: Vec<String> = items.iter().map(|i| i.object_ref().to_string()).collect();
        tracing::error!(
            kind = %R::KIND,
            returned = len,
            report = %report,
            "Limit check failed"
        );
        return Err(ControlError::CheckLimit {
            report,
            items: listed,
        });
    }

    let mut items = items;
    if limits.exact == Some(1) {
        if let Some(item) = items.pop() {
            return Ok(Retrieved::Single(item));
        }
    }
    Ok(Retrieved::List(items))
}

/// How a search is executed against a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Plan {
    /// One request per search group, unioned.
    PerGroup(Vec<FetchRequest>),
    /// One unfiltered request, optionally narrowed on the client.
    Unfiltered {
        request: FetchRequest,
        client_filter: bool,
    },
}

pub(crate) fn plan(
    kind: ObjectKind,
    search: &SearchSpec,
    options: &RetrieveOptions,
) -> Result<Plan> {
    let defects = options.defects.unwrap_or_else(|| kind.defects());
    let mut unfiltered = FetchRequest::list(kind).include_hidden(options.include_hidden);
    if defects.singular_request {
        unfiltered.target = FetchTarget::Single { id: None };
    }

    if search.is_empty() {
        return Ok(Plan::Unfiltered {
            request: unfiltered,
            client_filter: false,
        });
    }
    if defects.broken_filter {
        tracing::debug!(
            kind = %kind,
            "Collection ignores server-side filters, filtering on the client"
        );
        return Ok(Plan::Unfiltered {
            request: unfiltered,
            client_filter: true,
        });
    }

    search
        .groups
        .iter()
        .map(|group| group_request(kind, group, defects, options.include_hidden))
        .collect::<Result<Vec<_>>>()
        .map(Plan::PerGroup)
}

fn group_request(
    kind: ObjectKind,
    group: &SearchGroup,
    defects: RetrievalDefects,
    include_hidden: bool,
) -> Result<FetchRequest> {
    let filters: Vec<CacheFilter> = group.constraints.iter().map(CacheFilter::from).collect();

    let (target, filters) = if defects.singular_request {
        match group.id_value() {
            Some(id) => (FetchTarget::Single { id: Some(id) }, Vec::new()),
            None => (FetchTarget::Single { id: None }, filters),
        }
    } else if defects.group_id_lookup && group.constraints.iter().any(|c| c.field == "id") {
        let ids = group
            .constraints
            .iter()
            .filter(|c| c.field == "id")
            .map(|c| {
                c.value.parse::<ObjectId>().map_err(|_| {
                    ControlError::Validation(format!("{kind} id {:?} is not numeric", c.value))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        (FetchTarget::Lookup { ids }, Vec::new())
    } else {
        (FetchTarget::List, filters)
    };

    Ok(FetchRequest {
        kind,
        target,
        filters,
        include_hidden,
    })
}

/// Append items not already present, comparing by object identity.
fn union_into<R: Record>(accumulator: &mut Vec<R>, items: impl IntoIterator<Item = R>) {
    for item in items {
        if !accumulator.iter().any(|existing| existing.same_object(&item)) {
            accumulator.push(item);
        }
    }
}

/// Keep objects matching any constraint of any group, by field text.
fn client_side_filter<R: Record>(all: &[R], search: &SearchSpec) -> Vec<R> {
    let mut matched = Vec::new();
    for constraint in search.groups.iter().flat_map(|g| &g.constraints) {
        let hits = all
            .iter()
            .filter(|item| item.field_text(&constraint.field).as_deref() == Some(&*constraint.value))
            .cloned();
        union_into(&mut matched, hits);
    }
    matched
}

async fn fetch_decoded<R: Record, T: Transport + ?Sized>(
    transport: &T,
    request: &FetchRequest,
) -> Result<Vec<R>> {
    let values = transport.fetch_objects(request).await?;
    values
        .into_iter()
        .map(|value| R::from_value(value).map_err(ControlError::from))
        .collect()
}

/// Retrieve objects of type `R` matching `search`.
///
/// # Errors
///
/// Propagates transport and decode failures; returns
/// `ControlError::CheckLimit` if the limits in `options` are not met.
pub async fn retrieve<R: Record, T: Transport + ?Sized>(
    transport: &T,
    search: &SearchSpec,
    options: &RetrieveOptions,
) -> Result<Retrieved<R>> {
    let mut found: Vec<R> = Vec::new();

    match plan(R::KIND, search, options)? {
        Plan::PerGroup(requests) => {
            for request in &requests {
                let items = fetch_decoded::<R, T>(transport, request).await?;
                tracing::debug!(
                    kind = %R::KIND,
                    filters = request.filters.len(),
                    matched = items.len(),
                    "Search group retrieved"
                );
                union_into(&mut found, items);
            }
        }
        Plan::Unfiltered {
            request,
            client_filter,
        } => {
            let all = fetch_decoded::<R, T>(transport, &request).await?;
            if client_filter {
                found = client_side_filter(&all, search);
            } else {
                found = all;
            }
        }
    }

    tracing::debug!(kind = %R::KIND, count = found.len(), "Retrieved objects");
    check_limits(found, &options.limits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetq_core::{FieldConstraint, Group, PackageSpec, SavedQuestion, User};
    use fleetq_transport::{MockTransport, TransportCall};
    use serde_json::json;

    fn users() -> MockTransport {
        let mock = MockTransport::new();
        for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
            mock.insert(ObjectKind::User, json!({"id": id, "name": name}));
        }
        mock.ignore_filters_for(ObjectKind::User);
        mock
    }

    fn ids<R: Record>(items: &[R]) -> Vec<u64> {
        let mut ids: Vec<u64> = items.iter().filter_map(|i| i.id()).map(ObjectId::get).collect();
        ids.sort_unstable();
        ids
    }

    fn two_groups(a: &str, b: &str) -> SearchSpec {
        SearchSpec {
            groups: vec![SearchGroup::single("id", a), SearchGroup::single("id", b)],
        }
    }

    #[tokio::test]
    async fn broken_filter_workaround_unions_groups() {
        let mock = users();
        let found = retrieve::<User, _>(&mock, &two_groups("1", "2"), &RetrieveOptions::default())
            .await
            .unwrap()
            .into_vec();
        assert_eq!(ids(&found), vec![1, 2]);

        let fetches = mock.count_calls(|c| matches!(c, TransportCall::Fetch(_)));
        assert_eq!(fetches, 1);
    }

    #[tokio::test]
    async fn broken_filter_workaround_dedupes() {
        let mock = users();
        let search = SearchSpec {
            groups: vec![
                SearchGroup::single("id", "1"),
                SearchGroup {
                    constraints: vec![
                        FieldConstraint::new("name", "alice"),
                        FieldConstraint::new("id", "1"),
                    ],
                },
            ],
        };
        let found = retrieve::<User, _>(&mock, &search, &RetrieveOptions::default())
            .await
            .unwrap()
            .into_vec();
        assert_eq!(ids(&found), vec![1]);
    }

    #[tokio::test]
    async fn healthy_collection_sends_one_request_per_group() {
        let mock = MockTransport::new();
        for id in [1, 2, 3] {
            mock.insert(ObjectKind::SavedQuestion, json!({"id": id, "name": format!("sq{id}")}));
        }
        let found =
            retrieve::<SavedQuestion, _>(&mock, &two_groups("2", "3"), &RetrieveOptions::default())
                .await
                .unwrap()
                .into_vec();
        assert_eq!(ids(&found), vec![2, 3]);

        let filters: Vec<Vec<CacheFilter>> = mock
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Fetch(req) => Some(req.filters),
                _ => None,
            })
            .collect();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0][0].value, "2");
    }

    #[tokio::test]
    async fn overlapping_groups_do_not_duplicate() {
        let mock = MockTransport::new();
        mock.insert(ObjectKind::SavedQuestion, json!({"id": 7, "name": "Daily"}));
        let search = SearchSpec {
            groups: vec![SearchGroup::single("id", "7"), SearchGroup::single("name", "Daily")],
        };
        let found = retrieve::<SavedQuestion, _>(&mock, &search, &RetrieveOptions::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn empty_search_returns_whole_collection() {
        let mock = users();
        let found = retrieve::<User, _>(&mock, &SearchSpec::default(), &RetrieveOptions::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn singular_request_by_id_drops_filters() {
        let search = SearchSpec::by_id(ObjectId::new(12));
        let Plan::PerGroup(requests) =
            plan(PackageSpec::KIND, &search, &RetrieveOptions::default()).unwrap()
        else {
            panic!("expected per-group plan");
        };
        assert_eq!(
            requests[0].target,
            FetchTarget::Single {
                id: Some(ObjectId::new(12))
            }
        );
        assert!(requests[0].filters.is_empty());
    }

    #[test]
    fn singular_request_by_name_keeps_filters() {
        let search = SearchSpec::by_name("Distribute Patches");
        let Plan::PerGroup(requests) =
            plan(ObjectKind::Package, &search, &RetrieveOptions::default()).unwrap()
        else {
            panic!("expected per-group plan");
        };
        assert_eq!(requests[0].target, FetchTarget::Single { id: None });
        assert_eq!(requests[0].filters[0].field, "name");
    }

    #[test]
    fn singular_request_applies_without_search() {
        let Plan::Unfiltered {
            request,
            client_filter,
        } = plan(ObjectKind::Package, &SearchSpec::default(), &RetrieveOptions::default()).unwrap()
        else {
            panic!("expected unfiltered plan");
        };
        assert_eq!(request.target, FetchTarget::Single { id: None });
        assert!(request.filters.is_empty());
        assert!(!client_filter);

        let Plan::Unfiltered { request, .. } =
            plan(ObjectKind::Group, &SearchSpec::default(), &RetrieveOptions::default()).unwrap()
        else {
            panic!("expected unfiltered plan");
        };
        assert_eq!(request.target, FetchTarget::List);
    }

    #[test]
    fn group_id_lookup_replaces_filters() {
        let search = SearchSpec {
            groups: vec![SearchGroup {
                constraints: vec![
                    FieldConstraint::new("id", "4"),
                    FieldConstraint::new("name", "All Windows"),
                ],
            }],
        };
        let Plan::PerGroup(requests) =
            plan(Group::KIND, &search, &RetrieveOptions::default()).unwrap()
        else {
            panic!("expected per-group plan");
        };
        assert_eq!(
            requests[0].target,
            FetchTarget::Lookup {
                ids: vec![ObjectId::new(4)]
            }
        );
        assert!(requests[0].filters.is_empty());

        let bad = SearchSpec {
            groups: vec![SearchGroup::single("id", "four")],
        };
        assert!(plan(Group::KIND, &bad, &RetrieveOptions::default()).is_err());
    }

    #[test]
    fn defect_override_wins() {
        let options = RetrieveOptions {
            defects: Some(RetrievalDefects::NONE),
            ..RetrieveOptions::default()
        };
        let plan = plan(ObjectKind::User, &SearchSpec::by_name("bob"), &options).unwrap();
        assert!(matches!(plan, Plan::PerGroup(_)));
    }

    fn named(n: u64) -> Vec<User> {
        (1..=n)
            .map(|id| User {
                id: Some(ObjectId::new(id)),
                name: Some(format!("user{id}")),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn exactly_one_collapses() {
        let result = check_limits(named(1), &Limits::exactly_one()).unwrap();
        assert!(matches!(result, Retrieved::Single(ref u) if u.id == Some(ObjectId::new(1))));
    }

    #[test]
    fn exactly_one_fails_on_zero_and_two() {
        for n in [0, 2] {
            match check_limits(named(n), &Limits::exactly_one()) {
                Err(ControlError::CheckLimit { report, items }) => {
                    assert!(report.contains("'limit_exact' FAILED"), "{report}");
                    assert_eq!(items.len(), usize::try_from(n).unwrap());
                }
                other => panic!("expected CheckLimit, got {other:?}"),
            }
        }
    }

    #[test]
    fn composite_report_lists_every_limit() {
        let limits = Limits {
            min: Some(1),
            max: Some(2),
            exact: None,
        };
        let err = check_limits(named(3), &limits).unwrap_err();
        let ControlError::CheckLimit { report, items } = err else {
            panic!("expected CheckLimit");
        };
        assert_eq!(
            report,
            "'limit_min' PASSED (must be 1 items or more); \
             'limit_max' FAILED (must be 2 items or less); 'limit_exact' SKIPPED"
        );
        assert_eq!(items[0], "users id=1 name=\"user1\"");
    }

    #[test]
    fn exact_limit_above_one_stays_a_list() {
        let limits = Limits {
            exact: Some(2),
            ..Limits::default()
        };
        assert!(matches!(check_limits(named(2), &limits).unwrap(), Retrieved::List(ref v) if v.len() == 2));
    }
}
