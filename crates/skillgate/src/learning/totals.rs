use super::progress::{LearningProgressState, ProgressTotals};

/// Fold the whole document into fresh totals. Never incremental, so drift cannot accumulate.
pub fn aggregate(state: &LearningProgressState) -> ProgressTotals {
    let (base_xp, hint_penalty, completed_topics) = state.courses.values().fold(
        (0u32, 0u32, 0u32),
        |(xp, penalty, completed), course| {
            let course_completed = course
                .topics()
                .filter(|(_, topic)| topic.status.is_completed())
                .count() as u32;
            (
                xp.saturating_add(course.xp),
                penalty.saturating_add(course.hint_penalty),
                completed + course_completed,
            )
        },
    );

    ProgressTotals {
        base_xp,
        hint_penalty,
        net_xp: base_xp.saturating_sub(hint_penalty),
        completed_topics,
    }
}

/// Recompute and store the totals on the document.
pub fn refresh(state: &mut LearningProgressState) -> ProgressTotals {
    let totals = aggregate(state);
    state.totals = totals;
    totals
}
