//! Pure distance and threshold functions over face encodings.
//!
//! Distances are raw Euclidean distances in the embedder's vector space; no
//! calibration is applied. Vectors of different length are incomparable and
//! never match.

/// Euclidean distance between two encodings, `None` when their lengths differ.
pub fn face_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let sum_sq: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Some(sum_sq.sqrt())
}

/// Closest comparable candidate as `(index, distance)`.
///
/// Ties resolve to the earliest face. Non-finite distances are skipped.
/// `None` when no candidate is comparable.
pub fn best_match(reference: &[f32], candidates: &[Vec<f32>]) -> Option<(usize, f32)> {
    candidates
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| face_distance(reference, c).map(|d| (idx, d)))
        .filter(|(_, d)| d.is_finite())
        .fold(None, |best: Option<(usize, f32)>, (idx, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((idx, d)),
        })
}

/// True iff any candidate lies within `tolerance` of `reference`.
///
/// An empty candidate list never matches.
pub fn matches(reference: &[f32], candidates: &[Vec<f32>], tolerance: f32) -> bool {
    best_match(reference, candidates).is_some_and(|(_, d)| d <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_basics() {
        assert_eq!(face_distance(&[0.0, 0.0], &[3.0, 4.0]), Some(5.0));
        assert_eq!(face_distance(&[1.0, 2.0], &[1.0, 2.0]), Some(0.0));
        assert_eq!(face_distance(&[1.0], &[1.0, 2.0]), None);
    }

    #[test]
    fn single_candidate_matches_iff_within_tolerance() {
        let reference = [0.0f32, 0.0];
        let v = vec![0.3f32, 0.4];
        assert!(matches(&reference, &[v.clone()], 0.5));
        assert!(matches(&reference, &[v.clone()], 0.5000001));
        assert!(!matches(&reference, &[v], 0.49));
    }

    #[test]
    fn zero_tolerance_requires_equality() {
        let reference = vec![0.25f32, -0.5, 1.0];
        assert!(matches(&reference, &[reference.clone()], 0.0));
        let nudged = vec![0.25f32, -0.5, 1.0001];
        assert!(!matches(&reference, &[nudged], 0.0));
    }

    #[test]
    fn raising_tolerance_never_loses_a_match() {
        let reference = [0.0f32; 4];
        let candidates = vec![vec![0.1f32, 0.2, 0.3, 0.4], vec![1.0, 1.0, 1.0, 1.0]];
        let mut matched = false;
        for step in 0..=40 {
            let tol = step as f32 * 0.05;
            let now = matches(&reference, &candidates, tol);
            assert!(!matched || now, "lost match at tolerance {tol}");
            matched = now;
        }
        assert!(matched);
    }

    #[test]
    fn empty_candidates_never_match() {
        for tol in [0.0, 0.5, 10.0, f32::MAX] {
            assert!(!matches(&[0.0, 0.0], &[], tol));
        }
        assert_eq!(best_match(&[0.0], &[]), None);
    }

    #[test]
    fn dimension_mismatch_never_matches() {
        let candidates = vec![vec![0.0f32, 0.0, 0.0]];
        assert!(!matches(&[0.0, 0.0], &candidates, f32::MAX));
        assert_eq!(best_match(&[0.0, 0.0], &candidates), None);
    }

    #[test]
    fn best_match_picks_closest_face() {
        let reference = [0.0f32, 0.0];
        let candidates = vec![vec![0.0f32, 0.8], vec![0.0, 0.3], vec![0.0, 0.3], vec![9.0]];
        assert_eq!(best_match(&reference, &candidates), Some((1, 0.3)));
    }

    #[test]
    fn non_finite_faces_are_skipped() {
        let reference = [0.4f32, 0.0, 0.0];
        let candidates = vec![vec![9.0f32, 9.0, 9.0], vec![f32::NAN, 0.0, 0.0]];
        let (idx, d) = best_match(&reference, &candidates).unwrap();
        assert_eq!(idx, 0);
        assert!(d.is_finite());
        assert!(!matches(&reference, &candidates, 0.5));

        let only_inf = vec![vec![f32::INFINITY, 0.0, 0.0]];
        assert_eq!(best_match(&reference, &only_inf), None);
        assert!(!matches(&reference, &only_inf, f32::MAX));
    }

    #[test]
    fn best_match_agrees_with_matches() {
        let reference = [0.0f32, 0.0];
        let candidates = vec![vec![0.0f32, 0.8], vec![f32::NAN, 0.0], vec![0.0, 0.3]];
        for tol in [0.0, 0.2, 0.3, 0.5, 1.0] {
            let by_best = best_match(&reference, &candidates).is_some_and(|(_, d)| d <= tol);
            assert_eq!(by_best, matches(&reference, &candidates, tol), "tolerance {tol}");
        }
    }
}
