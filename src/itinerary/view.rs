//! Display projection: group a flat snapshot into day buckets.
//!
//! Built fresh from the current snapshot whenever the snapshot reference
//! changes (loads, optimistic applies, commits, rollbacks). Pure — it never
//! mutates the snapshot and recomputing it has no observable side effects.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::types::{CollectionSnapshot, Record};

/// Records for a single day. `date: None` is the "unspecified date" bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct DayGroup {
  pub date: Option<NaiveDate>,
  pub records: Vec<Record>,
}

/// Day-bucketed view of one collection, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ItineraryView {
  pub days: Vec<DayGroup>,
}

/// Group the snapshot's records by date and order each bucket by
/// (time-period rank, sort_order).
///
/// Dated buckets come first in calendar order; records with no date land in a
/// trailing bucket. Within a bucket, the first time period's fixed rank wins;
/// records with no (or only unknown) periods sort after all ranked records,
/// then `sort_order` ascending with absent values last.
pub fn build_view(snapshot: &CollectionSnapshot) -> ItineraryView {
  let mut dated: BTreeMap<NaiveDate, Vec<Record>> = BTreeMap::new();
  let mut undated: Vec<Record> = Vec::new();

  for record in &snapshot.items {
    match record.date {
      Some(date) => dated.entry(date).or_default().push(record.clone()),
      None => undated.push(record.clone()),
    }
  }

  let mut days: Vec<DayGroup> = dated
    .into_iter()
    .map(|(date, mut records)| {
      records.sort_by(compare_within_day);
      DayGroup {
        date: Some(date),
        records,
      }
    })
    .collect();

  if !undated.is_empty() {
    undated.sort_by(compare_within_day);
    days.push(DayGroup {
      date: None,
      records: undated,
    });
  }

  ItineraryView { days }
}

fn compare_within_day(a: &Record, b: &Record) -> Ordering {
  let rank_a = a.period_rank().map(u32::from).unwrap_or(u32::MAX);
  let rank_b = b.period_rank().map(u32::from).unwrap_or(u32::MAX);

  rank_a.cmp(&rank_b).then_with(|| {
    let sort_a = a.sort_order.unwrap_or(f64::INFINITY);
    let sort_b = b.sort_order.unwrap_or(f64::INFINITY);
    sort_a.total_cmp(&sort_b)
  })
}
