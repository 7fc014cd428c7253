use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// One category's verbs. `verbs` is a fixed arena; `remaining` holds the
/// indices not yet handed out as a correct answer or a foil.
#[derive(Debug, Clone, PartialEq)]
pub struct VerbPool {
    pub category: u32,
    pub name: String,
    pub sociality: String,
    verbs: Vec<String>,
    remaining: Vec<usize>,
    used_as_foil: usize,
}

impl VerbPool {
    pub fn new(category: u32, name: String, sociality: String, verbs: Vec<String>) -> Self {
        let remaining = (0..verbs.len()).collect();
        Self {
            category,
            name,
            sociality,
            verbs,
            remaining,
            used_as_foil: 0,
        }
    }

    pub fn verbs(&self) -> &[String] {
        &self.verbs
    }

    pub fn remaining(&self) -> impl Iterator<Item = &str> {
        self.remaining.iter().map(|&i| self.verbs[i].as_str())
    }

    pub fn remaining_len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_drained(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn used_as_foil(&self) -> usize {
        self.used_as_foil
    }

    /// Shuffles what is left and takes the head.
    pub fn draw<R: Rng>(&mut self, rng: &mut R) -> Option<String> {
        if self.remaining.is_empty() {
            return None;
        }
        self.remaining.shuffle(rng);
        let idx = self.remaining.remove(0);
        Some(self.verbs[idx].clone())
    }

    pub(crate) fn mark_foil(&mut self) {
        self.used_as_foil += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerbBook {
    pools: BTreeMap<u32, VerbPool>,
}

impl VerbBook {
    pub fn new(pools: BTreeMap<u32, VerbPool>) -> Self {
        Self { pools }
    }

    pub fn pool(&self, category: u32) -> Option<&VerbPool> {
        self.pools.get(&category)
    }

    pub(crate) fn pool_mut(&mut self, category: u32) -> Option<&mut VerbPool> {
        self.pools.get_mut(&category)
    }

    pub fn pools(&self) -> impl Iterator<Item = &VerbPool> {
        self.pools.values()
    }

    pub fn category_ids(&self) -> Vec<u32> {
        self.pools.keys().copied().collect()
    }

    pub fn category_of_verb(&self, verb: &str) -> Option<u32> {
        self.pools
            .values()
            .find(|pool| pool.verbs.iter().any(|v| v == verb))
            .map(|pool| pool.category)
    }

    pub fn is_confusable(&self, category: u32, confusable: &[String]) -> bool {
        self.pools
            .get(&category)
            .map(|pool| confusable.iter().any(|name| *name == pool.name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeding::rng_from_seed;

    fn pool() -> VerbPool {
        VerbPool::new(
            3,
            "cooking".to_string(),
            "nonsocial".to_string(),
            vec!["stir", "chop", "fry", "bake"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }

    #[test]
    fn draw_consumes_each_verb_once() {
        let mut p = pool();
        let mut rng = rng_from_seed(11);
        let mut seen = Vec::new();
        while let Some(v) = p.draw(&mut rng) {
            assert!(!seen.contains(&v), "verb {} drawn twice", v);
            seen.push(v);
        }
        seen.sort();
        assert_eq!(seen, vec!["bake", "chop", "fry", "stir"]);
        assert!(p.is_drained());
        assert_eq!(p.verbs().len(), 4);
    }

    #[test]
    fn draw_is_reproducible_for_a_seed() {
        let mut a = pool();
        let mut b = pool();
        let xs: Vec<_> = (0..4).map(|i| a.draw(&mut rng_from_seed(100 + i))).collect();
        let ys: Vec<_> = (0..4).map(|i| b.draw(&mut rng_from_seed(100 + i))).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn remaining_tracks_draws() {
        let mut p = pool();
        let drawn = p.draw(&mut rng_from_seed(1)).expect("verb");
        assert_eq!(p.remaining_len(), 3);
        assert!(p.remaining().all(|v| v != drawn));
    }

    #[test]
    fn confusable_by_category_name() {
        let mut pools = BTreeMap::new();
        pools.insert(3, pool());
        let book = VerbBook::new(pools);
        let confusable = vec!["cooking".to_string()];
        assert!(book.is_confusable(3, &confusable));
        assert!(!book.is_confusable(3, &[]));
        assert!(!book.is_confusable(9, &confusable));
        assert_eq!(book.category_of_verb("fry"), Some(3));
        assert_eq!(book.category_of_verb("swim"), None);
    }
}
