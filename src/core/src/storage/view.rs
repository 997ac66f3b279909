use crate::storage::types::{Data, View};

/// Pivots records into `Topic -> DateTime -> Value`.
///
/// Only topics with at least one record appear. A later record for the same
/// `(topic, date_time)` replaces the earlier one.
pub fn pivot<I>(records: I) -> View
where
    I: IntoIterator<Item = Data>,
{
    let mut view = View::new();
    for d in records {
        view.entry(d.topic).or_default().insert(d.date_time, d.value);
    }
    view
}
