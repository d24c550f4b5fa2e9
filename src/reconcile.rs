use crate::pool::{SelectedStudent, Student, StudentPool};

/// Rebuild a working pool when editing a previously submitted document.
///
/// Persisted rows stay selected with their fees frozen; where a fresh
/// candidate matches by reference id, identity fields (names, roll,
/// locality) refresh from the fresh record and the candidate leaves the
/// available side. A persisted row with no fresh match is kept as-is;
/// historical document data is never silently dropped.
///
/// Reconciling the same inputs twice yields the same pool.
pub fn reconcile(persisted: Vec<SelectedStudent>, fresh: Vec<Student>) -> StudentPool {
    let selected: Vec<SelectedStudent> = persisted
        .into_iter()
        .map(|mut p| {
            if let Some(f) = fresh.iter().find(|f| f.ref_id == p.ref_id) {
                p.first_name = f.first_name.clone();
                p.last_name = f.last_name.clone();
                p.college_roll = f.college_roll.clone();
                p.locality = f.locality;
            }
            p
        })
        .collect();

    // from_parts drops fresh rows that collide with a selected id, which is
    // exactly the "minus all persisted identities" rule.
    StudentPool::from_parts(fresh, selected)
}
