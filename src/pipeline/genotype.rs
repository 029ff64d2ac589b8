//! `simple_genotype_filter` (spec.md §4 data flow; grounded on
//! `original_source/modules/variants/simple_genotype_filter.h`, "Genotypes
//! input assemblies based on the min depth of the variants").
//!
//! Sets each assembly's `genotype_quality` and discards assemblies whose
//! alt-supporting depth falls below `min_depth`, reporting discards
//! through a callback the way `PloidLimiter` does.

use crate::assembly::Assembly;
use crate::pipeline::{ExpectedOrder, Stage};

#[derive(Debug, Clone, Copy)]
pub struct GenotypeOptions {
    pub min_depth: u32,
}

impl Default for GenotypeOptions {
    fn default() -> Self {
        GenotypeOptions { min_depth: 4 }
    }
}

/// Minimum inter-base coverage across the assembly's span, standing in
/// for "the depth of the variant" referenced by the original filter.
fn alt_depth(a: &Assembly) -> u32 {
    a.coverage.iter().copied().min().unwrap_or(0)
}

/// Derives a `GT` string and a Phred-like genotype quality from an
/// assembly's ref/alt depth split. Exposed for the VCF-emission wiring
/// that turns a post-pipeline assembly into a [`crate::vcf_out::VcfRecord`].
pub fn call_genotype(a: &Assembly) -> (String, f64) {
    let alt = alt_depth(a);
    let total = alt + a.ref_depth;
    if total == 0 {
        return ("./.".to_string(), 0.0);
    }
    let ratio = alt as f64 / total as f64;
    let gt = if ratio >= 0.85 {
        "1/1"
    } else if ratio >= 0.2 {
        "0/1"
    } else {
        "0/0"
    };
    let gq = (10.0 * (total as f64 + 1.0).log10() * 10.0).min(99.0);
    (gt.to_string(), gq)
}

pub struct SimpleGenotypeFilter<S: Stage> {
    downstream: S,
    options: GenotypeOptions,
    on_discard: Box<dyn FnMut(&Assembly) + Send>,
}

impl<S: Stage> SimpleGenotypeFilter<S> {
    pub fn new(downstream: S, options: GenotypeOptions) -> Self {
        SimpleGenotypeFilter { downstream, options, on_discard: Box::new(|_| {}) }
    }

    pub fn with_discard_handler(mut self, on_discard: impl FnMut(&Assembly) + Send + 'static) -> Self {
        self.on_discard = Box::new(on_discard);
        self
    }
}

impl<S: Stage> Stage for SimpleGenotypeFilter<S> {
    fn expected_order(&self) -> ExpectedOrder {
        self.downstream.expected_order()
    }

    fn add(&mut self, mut a: Assembly) {
        if a.matches_reference {
            self.downstream.add(a);
            return;
        }
        let (_, gq) = call_genotype(&a);
        a.genotype_quality = gq;
        if alt_depth(&a) < self.options.min_depth {
            (self.on_discard)(&a);
            return;
        }
        self.downstream.add(a);
    }

    fn flush(&mut self) {
        self.downstream.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::OptionalOffset;
    use crate::dna::Seq;
    use pretty_assertions::assert_eq;

    struct Collector(Vec<Assembly>);
    impl Stage for Collector {
        fn expected_order(&self) -> ExpectedOrder {
            ExpectedOrder::Canonical
        }
        fn add(&mut self, a: Assembly) {
            self.0.push(a);
        }
        fn flush(&mut self) {}
    }

    fn asm(coverage: Vec<u32>, ref_depth: u32) -> Assembly {
        let mut a = Assembly::new(OptionalOffset::some(0), OptionalOffset::some(1), Seq::new());
        a.coverage = coverage;
        a.ref_depth = ref_depth;
        a
    }

    #[test]
    fn call_genotype_reports_homozygous_alt_for_pure_alt_depth() {
        let a = asm(vec![10, 10], 0);
        let (gt, _) = call_genotype(&a);
        assert_eq!(gt, "1/1");
    }

    #[test]
    fn call_genotype_reports_heterozygous_for_balanced_depth() {
        let a = asm(vec![5, 5], 5);
        let (gt, _) = call_genotype(&a);
        assert_eq!(gt, "0/1");
    }

    #[test]
    fn filter_discards_low_depth_assemblies() {
        let mut filter = SimpleGenotypeFilter::new(Collector(Vec::new()), GenotypeOptions { min_depth: 4 });
        let mut discarded = Vec::new();
        filter = filter.with_discard_handler(move |a| discarded.push(a.assembly_id));
        filter.add(asm(vec![1, 1], 0));
        filter.flush();
        assert!(filter.downstream.0.is_empty());
    }

    #[test]
    fn filter_passes_reference_matching_assemblies_through_unconditionally() {
        let mut a = asm(vec![0, 0], 0);
        a.matches_reference = true;
        let mut filter = SimpleGenotypeFilter::new(Collector(Vec::new()), GenotypeOptions::default());
        filter.add(a);
        filter.flush();
        assert_eq!(filter.downstream.0.len(), 1);
    }
}
