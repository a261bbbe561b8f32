//! Joint filter: drops the joints a handler must never forward.
//!
//! Filtering is exact-string membership in an [`ExclusionSet`] and never
//! reorders the joints that remain.

use retarget_types::{ExclusionSet, JointSample};

/// Iterate over the joints of `joints` whose name is not in `excluded`, in
/// their original order.
pub fn retained<'a>(
    joints: &'a [JointSample],
    excluded: &'a ExclusionSet,
) -> impl Iterator<Item = &'a JointSample> + 'a {
    joints.iter().filter(move |joint| !excluded.contains(&joint.name))
}

/// Number of joints in `joints` that `excluded` removes.
pub fn excluded_count(joints: &[JointSample], excluded: &ExclusionSet) -> usize {
    joints.iter().filter(|joint| excluded.contains(&joint.name)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joints(names: &[&str]) -> Vec<JointSample> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| JointSample::new(*name, i as f64, -(i as f64)))
            .collect()
    }

    fn names<'a>(iter: impl Iterator<Item = &'a JointSample>) -> Vec<&'a str> {
        iter.map(|j| j.name.as_str()).collect()
    }

    #[test]
    fn removes_excluded_and_keeps_order() {
        let input = joints(&["wheel_left", "shoulder", "elbow", "wheel_right", "wrist"]);
        let excluded = ExclusionSet::mobile_base_wheels();
        assert_eq!(
            names(retained(&input, &excluded)),
            vec!["shoulder", "elbow", "wrist"]
        );
    }

    #[test]
    fn retained_length_matches_exclusion_arithmetic() {
        let cases: &[(&[&str], &[&str])] = &[
            (&[], &[]),
            (&["a", "b", "c"], &[]),
            (&["a", "b", "c"], &["b"]),
            (&["a", "b", "c"], &["a", "c", "not_present"]),
            (&["a", "b", "c"], &["a", "b", "c"]),
            (&["x"], &["y", "z"]),
        ];
        for (input, exclude) in cases {
            let input = joints(input);
            let excluded: ExclusionSet = exclude.iter().copied().collect();
            let kept: Vec<&JointSample> = retained(&input, &excluded).collect();
            assert_eq!(kept.len(), input.len() - excluded_count(&input, &excluded));
            assert!(kept.iter().all(|j| !excluded.contains(&j.name)));

            // Relative order preserved: kept names appear as a subsequence.
            let mut cursor = input.iter();
            for joint in &kept {
                assert!(cursor.any(|orig| orig.name == joint.name));
            }
        }
    }

    #[test]
    fn matching_is_exact_string_only() {
        let input = joints(&["Wheel_Left", "wheel_left ", "wheel_left"]);
        let excluded = ExclusionSet::mobile_base_wheels();
        assert_eq!(
            names(retained(&input, &excluded)),
            vec!["Wheel_Left", "wheel_left "]
        );
    }

    #[test]
    fn values_travel_with_their_names() {
        let input = joints(&["wheel_left", "shoulder"]);
        let excluded = ExclusionSet::mobile_base_wheels();
        let kept: Vec<&JointSample> = retained(&input, &excluded).collect();
        assert_eq!(kept.len(), 1);
        assert!((kept[0].position - 1.0).abs() < f64::EPSILON);
        assert!((kept[0].velocity - (-1.0)).abs() < f64::EPSILON);
    }
}
