// =============================================================================
// Posterior Draws
// =============================================================================
//
// Draws are stored as a dense 3-D array indexed [iteration, chain, parameter]
// together with one name per parameter. The same container carries the raw
// engine output (names like `beta[2]`, `lp__`) and the recovered, relabelled
// draws (names like `age`, `low|mid`, `log-posterior`).
//
// =============================================================================

use ndarray::{concatenate, Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::error::{PolrError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Draws {
    values: Array3<f64>,
    names: Vec<String>,
}

impl Draws {
    pub fn new(values: Array3<f64>, names: Vec<String>) -> Result<Self> {
        if values.len_of(Axis(2)) != names.len() {
            return Err(PolrError::DimensionMismatch(format!(
                "draws have {} parameters but {} names were given",
                values.len_of(Axis(2)),
                names.len()
            )));
        }
        Ok(Self { values, names })
    }

    /// Build from a single chain stored as iteration × parameter.
    pub fn from_single_chain(chain: Array2<f64>, names: Vec<String>) -> Result<Self> {
        let values = chain.insert_axis(Axis(1));
        Self::new(values, names)
    }

    /// Stack chains that share parameter names and length.
    pub fn stack_chains(chains: Vec<Draws>) -> Result<Self> {
        let first = chains
            .first()
            .ok_or_else(|| PolrError::EmptyInput("no chains to combine".to_string()))?;
        let names = first.names.clone();
        for (c, d) in chains.iter().enumerate().skip(1) {
            if d.names != names {
                return Err(PolrError::Backend(format!(
                    "chain {} reports different parameters than chain 0",
                    c
                )));
            }
            if d.n_iterations() != first.n_iterations() {
                return Err(PolrError::Backend(format!(
                    "chain {} has {} draws but chain 0 has {}",
                    c,
                    d.n_iterations(),
                    first.n_iterations()
                )));
            }
        }
        let views: Vec<_> = chains.iter().map(|d| d.values.view()).collect();
        let values = concatenate(Axis(1), &views)
            .map_err(|e| PolrError::Backend(format!("failed to combine chains: {}", e)))?;
        Self::new(values, names)
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut Array3<f64> {
        &mut self.values
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_iterations(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    pub fn n_chains(&self) -> usize {
        self.values.len_of(Axis(1))
    }

    pub fn n_params(&self) -> usize {
        self.names.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Draws of one parameter as iteration × chain.
    pub fn column(&self, name: &str) -> Option<ArrayView2<'_, f64>> {
        self.index_of(name)
            .map(|i| self.values.index_axis(Axis(2), i))
    }

    /// Draws of one parameter in one chain.
    pub fn chain(&self, name: &str, chain: usize) -> Option<ArrayView1<'_, f64>> {
        if chain >= self.n_chains() {
            return None;
        }
        self.column(name).map(|col| col.index_axis_move(Axis(1), chain))
    }

    /// All draws of one parameter, chains concatenated in order.
    pub fn pooled(&self, name: &str) -> Option<Vec<f64>> {
        self.column(name)
            .map(|col| col.t().iter().copied().collect())
    }

    /// Positions of a parameter block: either a scalar named exactly `block`
    /// or the elements `block[1]`, `block[2]`, ... ordered by index.
    pub fn block_indices(&self, block: &str) -> Vec<usize> {
        if let Some(i) = self.index_of(block) {
            return vec![i];
        }
        let prefix = format!("{}[", block);
        let mut found: Vec<(usize, usize)> = self
            .names
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                let inner = name.strip_prefix(&prefix)?.strip_suffix(']')?;
                inner.parse::<usize>().ok().map(|k| (k, i))
            })
            .collect();
        found.sort_unstable();
        found.into_iter().map(|(_, i)| i).collect()
    }

    /// New draws with the given parameters (by position) under new names.
    pub fn select(&self, indices: &[usize], names: Vec<String>) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_params()) {
            return Err(PolrError::DimensionMismatch(format!(
                "parameter index {} out of range for {} parameters",
                bad,
                self.n_params()
            )));
        }
        Self::new(self.values.select(Axis(2), indices), names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    fn two_chain_draws() -> Draws {
        // 3 iterations, 2 chains, 3 parameters
        let values = Array3::from_shape_fn((3, 2, 3), |(i, c, p)| {
            (100 * p + 10 * c + i) as f64
        });
        Draws::new(values, names(&["beta[2]", "lp__", "beta[1]"])).unwrap()
    }

    #[test]
    fn test_shape_accessors() {
        let d = two_chain_draws();
        assert_eq!(d.n_iterations(), 3);
        assert_eq!(d.n_chains(), 2);
        assert_eq!(d.n_params(), 3);
    }

    #[test]
    fn test_column_and_chain() {
        let d = two_chain_draws();
        let col = d.column("lp__").unwrap();
        assert_eq!(col.dim(), (3, 2));
        assert_eq!(col[[2, 1]], 112.0);
        assert_eq!(d.chain("lp__", 1).unwrap().to_vec(), vec![110.0, 111.0, 112.0]);
        assert!(d.chain("lp__", 2).is_none());
        assert!(d.column("missing").is_none());
    }

    #[test]
    fn test_pooled_is_chain_major() {
        let d = two_chain_draws();
        assert_eq!(
            d.pooled("beta[2]").unwrap(),
            vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]
        );
    }

    #[test]
    fn test_block_indices_sorted_by_element() {
        let d = two_chain_draws();
        assert_eq!(d.block_indices("beta"), vec![2, 0]);
        assert_eq!(d.block_indices("lp__"), vec![1]);
        assert!(d.block_indices("zeta").is_empty());
    }

    #[test]
    fn test_select_renames() {
        let d = two_chain_draws();
        let s = d.select(&[2, 0], names(&["a", "b"])).unwrap();
        assert_eq!(s.names(), &["a", "b"]);
        assert_eq!(s.column("a").unwrap()[[0, 0]], 200.0);
        assert!(d.select(&[5], names(&["x"])).is_err());
    }

    #[test]
    fn test_stack_chains() {
        let a = Draws::from_single_chain(array![[1.0], [2.0]], names(&["p"])).unwrap();
        let b = Draws::from_single_chain(array![[3.0], [4.0]], names(&["p"])).unwrap();
        let s = Draws::stack_chains(vec![a, b]).unwrap();
        assert_eq!(s.n_chains(), 2);
        assert_eq!(s.pooled("p").unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_stack_chains_mismatched_lengths() {
        let a = Draws::from_single_chain(array![[1.0], [2.0]], names(&["p"])).unwrap();
        let b = Draws::from_single_chain(array![[3.0]], names(&["p"])).unwrap();
        assert!(matches!(
            Draws::stack_chains(vec![a, b]),
            Err(PolrError::Backend(_))
        ));
    }

    #[test]
    fn test_name_count_mismatch() {
        assert!(Draws::new(Array3::zeros((1, 1, 2)), names(&["a"])).is_err());
    }
}
