//! Adherence aggregation over normalized dose events.

use std::collections::HashMap;

use crate::config::DelayedBucket;
use crate::models::enums::DoseStatus;
use crate::models::{DoseEvent, SubjectId};

use super::types::AdherenceSummary;

/// Counting policy for statuses whose bucket is a judgement call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdherencePolicy {
    pub delayed_bucket: DelayedBucket,
}

/// Summary bucket a status is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Completed,
    Missed,
    Pending,
}

pub fn bucket_of(status: DoseStatus, policy: &AdherencePolicy) -> Bucket {
    match status {
        DoseStatus::Taken => Bucket::Completed,
        DoseStatus::Missed | DoseStatus::Skipped => Bucket::Missed,
        DoseStatus::Delayed => match policy.delayed_bucket {
            DelayedBucket::Pending => Bucket::Pending,
            DelayedBucket::Missed => Bucket::Missed,
        },
        DoseStatus::Pending | DoseStatus::Unknown => Bucket::Pending,
    }
}

/// Whole-percent completion; 0 when there is nothing to complete.
pub fn completion_rate(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u32
}

/// Aggregate a scope's dose events into one summary.
pub fn aggregate(events: &[DoseEvent], policy: &AdherencePolicy) -> AdherenceSummary {
    let mut summary = AdherenceSummary::default();
    let mut last: Option<&DoseEvent> = None;

    for event in events {
        summary.total += 1;
        if event.status == DoseStatus::Delayed {
            summary.delayed += 1;
        }
        match bucket_of(event.status, policy) {
            Bucket::Completed => summary.completed += 1,
            Bucket::Missed => {
                summary.missed += 1;
                summary.missed_events.push(event.clone());
            }
            Bucket::Pending => summary.pending += 1,
        }

        let Some(at) = event.activity_time() else {
            continue;
        };
        let newer = last.map_or(true, |current| {
            (Some(at), event.ingest_seq) > (current.activity_time(), current.ingest_seq)
        });
        if newer {
            last = Some(event);
        }
    }

    summary.completion_rate = completion_rate(summary.completed, summary.total);
    summary.last_dose = last.cloned();
    summary
}

/// Per-subject summaries, in order of first appearance.
pub fn aggregate_by_subject(
    events: &[DoseEvent],
    policy: &AdherencePolicy,
) -> Vec<(SubjectId, AdherenceSummary)> {
    let mut order: Vec<SubjectId> = Vec::new();
    let mut groups: HashMap<&SubjectId, Vec<DoseEvent>> = HashMap::new();

    for event in events {
        let group = groups.entry(&event.subject_user_id).or_default();
        if group.is_empty() {
            order.push(event.subject_user_id.clone());
        }
        group.push(event.clone());
    }

    order
        .into_iter()
        .map(|subject| {
            let summary = groups
                .get(&subject)
                .map(|group| aggregate(group, policy))
                .unwrap_or_default();
            (subject, summary)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use serde_json::json;

    use super::*;
    use crate::monitoring::normalizer::normalize_dose_batch;
    use crate::monitoring::types::NormalizeContext;

    fn now() -> DateTime<Utc> {
        "2026-03-10T12:00:00Z".parse().unwrap()
    }

    fn event(id: &str, status: DoseStatus, taken_at: Option<DateTime<Utc>>, seq: u64) -> DoseEvent {
        DoseEvent {
            id: id.into(),
            subject_user_id: SubjectId::new("u1"),
            subject_name: None,
            medicine_name: Some("Metformin".into()),
            dose: None,
            scheduled_at: None,
            taken_at,
            status,
            recorded_at: None,
            ingest_seq: seq,
        }
    }

    #[test]
    fn mixed_shape_scenario() {
        let ctx = NormalizeContext::new(now()).with_default_subject(SubjectId::new("me"));
        let past = (now() - Duration::minutes(15)).to_rfc3339();
        let records = vec![
            json!({"status": "taken"}),
            json!({"status": "missed"}),
            json!({"confirmed": false}),
            json!({"scheduled_time": past, "status": null}),
        ];
        let batch = normalize_dose_batch(&records, &ctx);
        assert!(batch.failures.is_empty());

        let summary = aggregate(&batch.records, &AdherencePolicy::default());
        assert_eq!(summary.total, 4);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.missed, 2);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.delayed, 1);
        assert_eq!(summary.completion_rate, 25);
        assert_eq!(summary.missed_events.len(), 2);
    }

    #[test]
    fn empty_input_has_zero_rate() {
        let summary = aggregate(&[], &AdherencePolicy::default());
        assert_eq!(summary.total, 0);
        assert_eq!(summary.completion_rate, 0);
        assert!(summary.last_dose.is_none());
    }

    #[test]
    fn buckets_always_sum_to_total() {
        let statuses = [
            DoseStatus::Taken,
            DoseStatus::Missed,
            DoseStatus::Delayed,
            DoseStatus::Skipped,
            DoseStatus::Pending,
            DoseStatus::Unknown,
            DoseStatus::Taken,
        ];
        for policy in [
            AdherencePolicy::default(),
            AdherencePolicy { delayed_bucket: DelayedBucket::Missed },
        ] {
            let events: Vec<DoseEvent> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| event(&i.to_string(), *s, None, i as u64))
                .collect();
            let summary = aggregate(&events, &policy);
            assert_eq!(summary.completed + summary.missed + summary.pending, summary.total);
            assert!(summary.completion_rate <= 100);
        }
    }

    #[test]
    fn delayed_policy_moves_bucket_not_count() {
        let events = vec![event("a", DoseStatus::Delayed, None, 0)];
        let as_pending = aggregate(&events, &AdherencePolicy::default());
        assert_eq!((as_pending.pending, as_pending.missed, as_pending.delayed), (1, 0, 1));

        let as_missed = aggregate(
            &events,
            &AdherencePolicy { delayed_bucket: DelayedBucket::Missed },
        );
        assert_eq!((as_missed.pending, as_missed.missed, as_missed.delayed), (0, 1, 1));
    }

    #[test]
    fn completion_rate_rounds() {
        assert_eq!(completion_rate(1, 3), 33);
        assert_eq!(completion_rate(2, 3), 67);
        assert_eq!(completion_rate(3, 3), 100);
    }

    #[test]
    fn last_dose_prefers_latest_time_then_latest_ingest() {
        let t1 = now() - Duration::hours(3);
        let t2 = now() - Duration::hours(1);
        let events = vec![
            event("late-ingested-old", DoseStatus::Taken, Some(t1), 5),
            event("tie-a", DoseStatus::Taken, Some(t2), 1),
            event("no-time", DoseStatus::Missed, None, 9),
            event("tie-b", DoseStatus::Taken, Some(t2), 2),
        ];
        let summary = aggregate(&events, &AdherencePolicy::default());
        assert_eq!(summary.last_dose.unwrap().id, "tie-b");
        assert_eq!(summary.total, 4);
    }

    #[test]
    fn last_dose_falls_back_to_schedule() {
        let mut scheduled_only = event("s", DoseStatus::Pending, None, 0);
        scheduled_only.scheduled_at = Some(now() + Duration::hours(2));
        let taken = event("t", DoseStatus::Taken, Some(now() - Duration::hours(1)), 1);
        let summary = aggregate(&[scheduled_only, taken], &AdherencePolicy::default());
        assert_eq!(summary.last_dose.unwrap().id, "s");
    }

    #[test]
    fn by_subject_keeps_first_seen_order() {
        let mut a = event("1", DoseStatus::Taken, None, 0);
        a.subject_user_id = SubjectId::new("u2");
        let b = event("2", DoseStatus::Missed, None, 1);
        let mut c = event("3", DoseStatus::Missed, None, 2);
        c.subject_user_id = SubjectId::new("u2");

        let groups = aggregate_by_subject(&[a, b, c], &AdherencePolicy::default());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, SubjectId::new("u2"));
        assert_eq!(groups[0].1.total, 2);
        assert_eq!(groups[0].1.completion_rate, 50);
        assert_eq!(groups[1].1.missed, 1);
    }
}
