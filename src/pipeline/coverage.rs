//! `calc_coverage`: per-assembly interbase and pair coverage (spec.md §4.8).
//!
//! Grounded in the original `calc_coverage`'s seqset walk: here the walk
//! is replaced with direct [`Readmap::get_prefix_reads`] lookups against
//! the assembly's own [`SeqsetPath`] entries, consistent with this
//! crate's in-memory-first approach in the tracers.

use crate::assembly::Assembly;
use crate::pipeline::{ExpectedOrder, Stage};
use crate::readmap::Readmap;
use crate::seqset::Seqset;

pub struct CoverageOptions {
    pub max_coverage_paths: usize,
}

impl Default for CoverageOptions {
    fn default() -> Self {
        CoverageOptions { max_coverage_paths: 32 }
    }
}

/// Attaches `coverage`/`pair_coverage` to every assembly passing through,
/// by walking its `seqset_entries` and accumulating supporting-read
/// lengths at each offset.
pub struct CoverageCalculator<'a, S: Stage> {
    downstream: S,
    seqset: &'a Seqset,
    readmap: &'a Readmap,
    options: CoverageOptions,
}

impl<'a, S: Stage> CoverageCalculator<'a, S> {
    pub fn new(downstream: S, seqset: &'a Seqset, readmap: &'a Readmap, options: CoverageOptions) -> Self {
        CoverageCalculator { downstream, seqset, readmap, options }
    }

    fn annotate(&self, mut a: Assembly) -> Assembly {
        let len = a.seq.len();
        let mut coverage = vec![0u32; len + 1];
        let mut pair_coverage = vec![0u32; len + 1];

        let mut paths = 0usize;
        'outer: for (&offset, ranges) in a.seqset_entries.entries() {
            let offset = (offset.max(0) as usize).min(len);
            for range in ranges {
                if paths >= self.options.max_coverage_paths {
                    break 'outer;
                }
                paths += 1;
                for read in self.readmap.get_prefix_reads(*range, 1) {
                    let end = (offset + read.len).min(len);
                    for slot in coverage.iter_mut().take(end + 1).skip(offset) {
                        *slot = slot.saturating_add(1);
                    }
                    if self.readmap.get_mate(read.read_id).is_some() {
                        for slot in pair_coverage.iter_mut().take(end + 1).skip(offset) {
                            *slot = slot.saturating_add(1);
                        }
                    }
                }
            }
        }
        let _ = self.seqset;

        a.coverage = coverage;
        a.pair_coverage = pair_coverage;
        a
    }
}

impl<'a, S: Stage> Stage for CoverageCalculator<'a, S> {
    fn expected_order(&self) -> ExpectedOrder {
        self.downstream.expected_order()
    }

    fn add(&mut self, a: Assembly) {
        self.downstream.add(self.annotate(a));
    }

    fn flush(&mut self) {
        self.downstream.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::OptionalOffset;
    use crate::testutil::{build_readmap, build_seqset, tseq};
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

    #[test]
    fn coverage_vector_has_seq_len_plus_one_entries() {
        let r1 = tseq("abcd");
        let r2 = tseq("bcde");
        let seqset = build_seqset(&[r1.clone(), r2.clone()]);
        let readmap = build_readmap(&[(r1, r2)], &seqset);
        let seq = tseq("abcde");
        let a = Assembly::new(OptionalOffset::some(0), OptionalOffset::some(seq.len() as i64), seq);

        let mut calc = CoverageCalculator::new(Collector(Vec::new()), &seqset, &readmap, CoverageOptions::default());
        calc.add(a);
        calc.flush();
        assert_eq!(calc.downstream.0[0].coverage.len(), calc.downstream.0[0].seq.len() + 1);
    }
}
