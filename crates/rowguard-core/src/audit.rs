//! Audit event normalization and merging.
//!
//! The database maintains two independent log sources: a coarse action log
//! (one record per captured statement) and a fine-grained column/condition
//! log. This module folds both into one typed, ordered event stream.
//! Ordering is timestamp-descending with ties broken by the sequence
//! number the upstream source assigned — never by arrival order here.
//! Read-only: merging never touches the sources.

use serde::Serialize;

/// Which upstream log a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditSource {
    /// The coarse action log.
    Coarse,
    /// The fine-grained column/condition log.
    Fine,
}

impl AuditSource {
    fn rank(self) -> u8 {
        match self {
            AuditSource::Coarse => 0,
            AuditSource::Fine => 1,
        }
    }
}

/// Normalized statement kind of an audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    /// Read.
    Select,
    /// Insert.
    Insert,
    /// Update.
    Update,
    /// Delete.
    Delete,
    /// Object creation.
    Create,
    /// Object alteration.
    Alter,
    /// Object removal.
    Drop,
    /// Privilege grant.
    Grant,
    /// Privilege revoke.
    Revoke,
    /// Session established.
    Logon,
    /// Session ended.
    Logoff,
    /// Anything else, carried verbatim.
    Other(String),
}

impl ActionKind {
    /// Normalize an upstream action or statement-type string.
    ///
    /// Matches on the first word so compound catalog names like
    /// "CREATE USER" normalize the same way "CREATE" does.
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.split_whitespace().next().unwrap_or("") {
            "SELECT" => ActionKind::Select,
            "INSERT" | "MERGE" => ActionKind::Insert,
            "UPDATE" => ActionKind::Update,
            "DELETE" => ActionKind::Delete,
            "CREATE" => ActionKind::Create,
            "ALTER" | "AUDIT" | "NOAUDIT" => ActionKind::Alter,
            "DROP" => ActionKind::Drop,
            "GRANT" => ActionKind::Grant,
            "REVOKE" => ActionKind::Revoke,
            "LOGON" => ActionKind::Logon,
            "LOGOFF" => ActionKind::Logoff,
            _ => ActionKind::Other(upper),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::Select => "SELECT",
            ActionKind::Insert => "INSERT",
            ActionKind::Update => "UPDATE",
            ActionKind::Delete => "DELETE",
            ActionKind::Create => "CREATE",
            ActionKind::Alter => "ALTER",
            ActionKind::Drop => "DROP",
            ActionKind::Grant => "GRANT",
            ActionKind::Revoke => "REVOKE",
            ActionKind::Logon => "LOGON",
            ActionKind::Logoff => "LOGOFF",
            ActionKind::Other(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

/// A record from the coarse action log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoarseAuditRecord {
    /// Capture time, epoch milliseconds.
    pub timestamp: u64,
    /// Monotonic sequence assigned by the source.
    pub sequence: u64,
    /// Session user the statement ran as.
    pub actor: String,
    /// Action name as the source records it.
    pub action: String,
    /// Object the statement touched, if recorded.
    pub object_name: Option<String>,
}

/// A record from the fine-grained column/condition log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FineAuditRecord {
    /// Capture time, epoch milliseconds.
    pub timestamp: u64,
    /// Monotonic sequence assigned by the source.
    pub sequence: u64,
    /// Session user the statement ran as.
    pub actor: String,
    /// Statement type as the source records it.
    pub statement_type: String,
    /// Object the policy watches.
    pub object_name: String,
    /// Audited column, if the policy names one.
    pub column: Option<String>,
    /// Condition that matched, if the policy carries one.
    pub condition: Option<String>,
    /// Name of the policy that captured the statement.
    pub policy_name: String,
}

/// One normalized audit event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    /// Capture time, epoch milliseconds.
    pub timestamp: u64,
    /// Upstream-assigned sequence number, the tiebreaker within a source.
    pub sequence: u64,
    /// Which log the event came from.
    pub source: AuditSource,
    /// Session user the statement ran as.
    pub actor: String,
    /// Normalized statement kind.
    pub action: ActionKind,
    /// Object the statement touched.
    pub object_name: Option<String>,
    /// Audited column, fine-grained events only.
    pub column: Option<String>,
    /// Condition that matched, fine-grained events only.
    pub matched_condition: Option<String>,
}

impl AuditEvent {
    fn from_coarse(r: CoarseAuditRecord) -> Self {
        Self {
            timestamp: r.timestamp,
            sequence: r.sequence,
            source: AuditSource::Coarse,
            actor: r.actor,
            action: ActionKind::parse(&r.action),
            object_name: r.object_name,
            column: None,
            matched_condition: None,
        }
    }

    fn from_fine(r: FineAuditRecord) -> Self {
        Self {
            timestamp: r.timestamp,
            sequence: r.sequence,
            source: AuditSource::Fine,
            actor: r.actor,
            action: ActionKind::parse(&r.statement_type),
            object_name: Some(r.object_name),
            column: r.column,
            matched_condition: r.condition,
        }
    }

    /// Sort key: descending stream position.
    fn key(&self) -> (u64, u64, u8) {
        (self.timestamp, self.sequence, self.source.rank())
    }
}

/// Continuation point for restarting a query where the last page ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuditCursor {
    /// Timestamp of the last returned event.
    pub timestamp: u64,
    /// Sequence of the last returned event.
    pub sequence: u64,
    /// Source of the last returned event.
    pub source: AuditSource,
}

impl AuditCursor {
    fn key(&self) -> (u64, u64, u8) {
        (self.timestamp, self.sequence, self.source.rank())
    }
}

/// Selection and paging for an audit query.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Only events touching this object (case-insensitive).
    pub object: Option<String>,
    /// Only events by this actor (case-insensitive).
    pub actor: Option<String>,
    /// Only events of this kind.
    pub action: Option<ActionKind>,
    /// Page size; 0 means the default of 50.
    pub page_size: usize,
    /// Resume after this point in the stream.
    pub cursor: Option<AuditCursor>,
}

impl AuditFilter {
    fn effective_page_size(&self) -> usize {
        if self.page_size == 0 {
            50
        } else {
            self.page_size
        }
    }

    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(object) = &self.object {
            match &event.object_name {
                Some(name) if name.eq_ignore_ascii_case(object) => {}
                _ => return false,
            }
        }
        if let Some(actor) = &self.actor {
            if !event.actor.eq_ignore_ascii_case(actor) {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if event.action != *action {
                return false;
            }
        }
        true
    }
}

/// One page of the merged stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditPage {
    /// Events in descending stream order.
    pub events: Vec<AuditEvent>,
    /// Cursor to pass back for the next page; `None` when exhausted.
    pub next: Option<AuditCursor>,
}

/// Merge the two log shapes into one ordered, filtered, paged stream.
pub fn merge_events(
    coarse: Vec<CoarseAuditRecord>,
    fine: Vec<FineAuditRecord>,
    filter: &AuditFilter,
) -> AuditPage {
    let mut events: Vec<AuditEvent> = coarse
        .into_iter()
        .map(AuditEvent::from_coarse)
        .chain(fine.into_iter().map(AuditEvent::from_fine))
        .filter(|e| filter.matches(e))
        .collect();

    events.sort_by(|a, b| b.key().cmp(&a.key()));

    if let Some(cursor) = &filter.cursor {
        let cursor_key = cursor.key();
        events.retain(|e| e.key() < cursor_key);
    }

    let page_size = filter.effective_page_size();
    let has_more = events.len() > page_size;
    events.truncate(page_size);

    let next = if has_more {
        events.last().map(|e| AuditCursor {
            timestamp: e.timestamp,
            sequence: e.sequence,
            source: e.source,
        })
    } else {
        None
    };

    AuditPage { events, next }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coarse(ts: u64, seq: u64, actor: &str, action: &str, object: Option<&str>) -> CoarseAuditRecord {
        CoarseAuditRecord {
            timestamp: ts,
            sequence: seq,
            actor: actor.to_string(),
            action: action.to_string(),
            object_name: object.map(|s| s.to_string()),
        }
    }

    fn fine(ts: u64, seq: u64, actor: &str, object: &str, column: Option<&str>) -> FineAuditRecord {
        FineAuditRecord {
            timestamp: ts,
            sequence: seq,
            actor: actor.to_string(),
            statement_type: "SELECT".to_string(),
            object_name: object.to_string(),
            column: column.map(|s| s.to_string()),
            condition: Some("BUDGET > 100000".to_string()),
            policy_name: "SALARY_WATCH".to_string(),
        }
    }

    #[test]
    fn test_action_kind_parse() {
        assert_eq!(ActionKind::parse("select"), ActionKind::Select);
        assert_eq!(ActionKind::parse("CREATE USER"), ActionKind::Create);
        assert_eq!(ActionKind::parse("LOGON"), ActionKind::Logon);
        assert_eq!(
            ActionKind::parse("TRUNCATE"),
            ActionKind::Other("TRUNCATE".to_string())
        );
    }

    #[test]
    fn test_merge_orders_descending_with_sequence_ties() {
        let page = merge_events(
            vec![
                coarse(100, 1, "A", "SELECT", Some("PROJECTS")),
                coarse(300, 4, "A", "UPDATE", Some("PROJECTS")),
                coarse(200, 2, "A", "INSERT", Some("PROJECTS")),
                // same timestamp as seq 2: higher sequence comes first
                coarse(200, 3, "A", "DELETE", Some("PROJECTS")),
            ],
            vec![],
            &AuditFilter::default(),
        );
        let kinds: Vec<_> = page.events.iter().map(|e| e.action.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::Update,
                ActionKind::Delete,
                ActionKind::Insert,
                ActionKind::Select
            ]
        );
        assert!(page.next.is_none());
    }

    #[test]
    fn test_merge_interleaves_both_sources() {
        let page = merge_events(
            vec![coarse(100, 1, "A", "SELECT", Some("PROJECTS"))],
            vec![fine(200, 1, "B", "PROJECTS", Some("BUDGET"))],
            &AuditFilter::default(),
        );
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.events[0].source, AuditSource::Fine);
        assert_eq!(page.events[0].column.as_deref(), Some("BUDGET"));
        assert_eq!(
            page.events[0].matched_condition.as_deref(),
            Some("BUDGET > 100000")
        );
        assert_eq!(page.events[1].source, AuditSource::Coarse);
    }

    #[test]
    fn test_filter_by_object_actor_action() {
        let records = vec![
            coarse(100, 1, "HR_USER", "SELECT", Some("PROJECTS")),
            coarse(200, 2, "IT_USER", "SELECT", Some("PROJECTS")),
            coarse(300, 3, "HR_USER", "UPDATE", Some("STAFF")),
        ];

        let page = merge_events(
            records.clone(),
            vec![],
            &AuditFilter {
                object: Some("projects".to_string()),
                ..AuditFilter::default()
            },
        );
        assert_eq!(page.events.len(), 2);

        let page = merge_events(
            records.clone(),
            vec![],
            &AuditFilter {
                actor: Some("hr_user".to_string()),
                ..AuditFilter::default()
            },
        );
        assert_eq!(page.events.len(), 2);

        let page = merge_events(
            records,
            vec![],
            &AuditFilter {
                action: Some(ActionKind::Update),
                ..AuditFilter::default()
            },
        );
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].object_name.as_deref(), Some("STAFF"));
    }

    #[test]
    fn test_cursor_restarts_without_overlap_or_gap() {
        let records: Vec<_> = (0..10)
            .map(|i| coarse(1000 + i, i, "A", "SELECT", Some("PROJECTS")))
            .collect();

        let first = merge_events(
            records.clone(),
            vec![],
            &AuditFilter {
                page_size: 4,
                ..AuditFilter::default()
            },
        );
        assert_eq!(first.events.len(), 4);
        let cursor = first.next.expect("more pages");

        let second = merge_events(
            records.clone(),
            vec![],
            &AuditFilter {
                page_size: 4,
                cursor: Some(cursor),
                ..AuditFilter::default()
            },
        );
        assert_eq!(second.events.len(), 4);

        let third = merge_events(
            records,
            vec![],
            &AuditFilter {
                page_size: 4,
                cursor: second.next,
                ..AuditFilter::default()
            },
        );
        assert_eq!(third.events.len(), 2);
        assert!(third.next.is_none());

        let mut all: Vec<u64> = first
            .events
            .iter()
            .chain(second.events.iter())
            .chain(third.events.iter())
            .map(|e| e.sequence)
            .collect();
        assert_eq!(all.len(), 10);
        all.dedup();
        assert_eq!(all.len(), 10, "no event repeated across pages");
    }

    #[test]
    fn test_empty_sources_yield_empty_page() {
        let page = merge_events(vec![], vec![], &AuditFilter::default());
        assert!(page.events.is_empty());
        assert!(page.next.is_none());
    }
}
