//! Collapse annotations that cover the identical span.
//!
//! Analyzers frequently report the same word twice (a `SPELLING` and a `TYPO`
//! finding for one misspelling). Only one survives per exact span: highest
//! category priority first, then highest severity, then earliest position in
//! the input (which callers order oldest-first so tracked ids win ties).

use crate::Annotation;
use std::collections::HashMap;

/// Higher is kept in preference.
pub fn category_priority(category: &str) -> u8 {
    match category.to_ascii_uppercase().as_str() {
        "GRAMMAR" => 10,
        "SPELLING" => 9,
        "PUNCTUATION" => 8,
        "STYLE" => 7,
        "FORMATTING" => 6,
        "TYPO" => 5,
        _ => 1,
    }
}

/// Keep one annotation per exact span; relative order of survivors is preserved.
pub fn collapse_identical_spans(annotations: Vec<Annotation>) -> Vec<Annotation> {
    collapse_identical_spans_by(annotations, |a| a)
}

/// [`collapse_identical_spans`] over any wrapper that exposes an annotation.
pub fn collapse_identical_spans_by<T, F>(items: Vec<T>, annotation: F) -> Vec<T>
where
    F: Fn(&T) -> &Annotation,
{
    if items.len() <= 1 {
        return items;
    }
    let span = |a: &Annotation| (a.range.start().value, a.range.end().value);
    let mut best: HashMap<(usize, usize), usize> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        let a = annotation(item);
        match best.get(&span(a)) {
            Some(&j) if !outranks(a, annotation(&items[j])) => {}
            _ => {
                best.insert(span(a), i);
            }
        }
    }
    items
        .into_iter()
        .enumerate()
        .filter(|(i, item)| best.get(&span(annotation(item))) == Some(i))
        .map(|(_, item)| item)
        .collect()
}

fn outranks(candidate: &Annotation, incumbent: &Annotation) -> bool {
    let c = (category_priority(&candidate.category), candidate.severity.rank());
    let i = (category_priority(&incumbent.category), incumbent.severity.rank());
    c > i
}
