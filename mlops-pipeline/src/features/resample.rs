//! Class balancing by random oversampling.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Per-class row counts before and after resampling.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassCounts {
    pub label: f64,
    pub before: usize,
    pub after: usize,
}

/// Duplicate randomly chosen rows of every minority class until each class
/// has as many rows as the majority class. Original rows come first, in
/// their original order; the duplicates are appended.
pub fn random_oversample(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    seed: Option<u64>,
) -> (Array2<f64>, Array1<f64>, Vec<ClassCounts>) {
    let mut groups: Vec<(f64, Vec<usize>)> = Vec::new();
    for (i, &label) in y.iter().enumerate() {
        match groups.iter_mut().find(|(l, _)| *l == label) {
            Some((_, rows)) => rows.push(i),
            None => groups.push((label, vec![i])),
        }
    }
    groups.sort_by(|a, b| a.0.total_cmp(&b.0));

    let majority = groups.iter().map(|(_, rows)| rows.len()).max().unwrap_or(0);
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut picks: Vec<usize> = (0..y.len()).collect();
    let mut counts = Vec::with_capacity(groups.len());
    for (label, rows) in &groups {
        let deficit = majority - rows.len();
        picks.extend((0..deficit).map(|_| rows[rng.gen_range(0..rows.len())]));
        counts.push(ClassCounts {
            label: *label,
            before: rows.len(),
            after: majority,
        });
    }

    let x_out = x.select(Axis(0), &picks);
    let y_out = y.select(Axis(0), &picks);
    tracing::debug!(
        rows_before = y.len(),
        rows_after = picks.len(),
        classes = groups.len(),
        "Oversampled minority classes"
    );
    (x_out, y_out, counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_oversample_reaches_parity() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        let (xs, ys, counts) = random_oversample(x.view(), y.view(), Some(7));

        assert_eq!(xs.nrows(), 8);
        assert_eq!(ys.iter().filter(|&&v| v == 1.0).count(), 4);
        assert_eq!(counts[1], ClassCounts { label: 1.0, before: 2, after: 4 });
        // Originals first, duplicates drawn from the minority rows.
        assert_eq!(xs.slice(ndarray::s![..6, ..]), x);
        for row in 6..8 {
            assert!(xs[[row, 0]] == 4.0 || xs[[row, 0]] == 5.0);
            assert_eq!(ys[row], 1.0);
        }
    }

    #[test]
    fn test_balanced_input_is_unchanged() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let (xs, ys, _) = random_oversample(x.view(), y.view(), None);
        assert_eq!(xs, x);
        assert_eq!(ys, y);
    }

    #[test]
    fn test_same_seed_same_rows() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0];
        let a = random_oversample(x.view(), y.view(), Some(42));
        let b = random_oversample(x.view(), y.view(), Some(42));
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
    }
}
