use modwatch_core::{CombinedRecord, PostRecord, StatusRecord};
use std::collections::HashMap;

/// Left outer join of Pass 1 rows with Pass 2 statuses on the post fullname.
/// Every Pass 1 row comes out exactly once, in its original order.
pub fn join_cohort(
    pass1: Vec<PostRecord>,
    statuses: &HashMap<String, StatusRecord>,
) -> Vec<CombinedRecord> {
    pass1
        .into_iter()
        .map(|post| {
            let status = statuses.get(&post.post_fullname);
            CombinedRecord::join(post, status)
        })
        .collect()
}
