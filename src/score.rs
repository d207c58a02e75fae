use std::collections::HashSet;

/// Number of distinct outputs. Exact string equality.
pub fn score<S: AsRef<str>>(outputs: &[S]) -> usize {
    outputs.iter().map(AsRef::as_ref).collect::<HashSet<&str>>().len()
}
