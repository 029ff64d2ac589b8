//! Left-alignment normalizer and VCF zero-length padder (spec.md §4.7).

use crate::assembly::Assembly;
use crate::pipeline::{ExpectedOrder, Stage};
use crate::reference::Reference;

/// Shifts every non-reference assembly as far left as possible while its
/// sequence still agrees with the reference on both bounding bases,
/// never crossing a scaffold extent boundary. Mirrors the original
/// "left-align indels" pass.
pub struct Normalizer<'a, S: Stage> {
    downstream: S,
    reference: &'a Reference,
}

impl<'a, S: Stage> Normalizer<'a, S> {
    pub fn new(downstream: S, reference: &'a Reference) -> Self {
        Normalizer { downstream, reference }
    }

    fn shift_left(&self, mut a: Assembly) -> Assembly {
        if a.matches_reference || a.seq.is_empty() {
            return a;
        }
        let (Some(mut left), Some(mut right)) =
            (a.left_offset.is_present().then(|| a.left_offset.get()), a.right_offset.is_present().then(|| a.right_offset.get()))
        else {
            return a;
        };

        loop {
            if left <= 0 {
                break;
            }
            let Some(prev_base) = self.reference.base_at((left - 1) as usize) else { break };
            let Some(last_base) = self.reference.base_at((right - 1) as usize) else { break };
            let seq_last = a.seq.get(a.seq.len() - 1);
            if seq_last != last_base {
                break;
            }
            // scaffold-extent boundary: don't let the shift walk onto a
            // different scaffold.
            let left_pos = self.reference.get_seq_position((left - 1) as usize);
            let right_pos = self.reference.get_seq_position(right as usize - 1);
            if left_pos.scaffold_id != right_pos.scaffold_id {
                break;
            }

            let mut shifted = a.seq.bases().to_vec();
            shifted.pop();
            shifted.insert(0, prev_base);
            a.seq = crate::dna::Seq::from_bases(shifted);
            left -= 1;
            right -= 1;
        }

        a.left_offset = crate::assembly::OptionalOffset::some(left);
        a.right_offset = crate::assembly::OptionalOffset::some(right);
        a
    }
}

impl<'a, S: Stage> Stage for Normalizer<'a, S> {
    fn expected_order(&self) -> ExpectedOrder {
        self.downstream.expected_order()
    }

    fn add(&mut self, a: Assembly) {
        self.downstream.add(self.shift_left(a));
    }

    fn flush(&mut self) {
        self.downstream.flush();
    }
}

/// Pads zero-length REF/ALT spans with one reference base so every VCF
/// record carries at least one base on both sides, per VCF 4.1. Leaves
/// multi-scaffold or already-padded assemblies untouched.
pub struct Padder<'a, S: Stage> {
    downstream: S,
    reference: &'a Reference,
}

impl<'a, S: Stage> Padder<'a, S> {
    pub fn new(downstream: S, reference: &'a Reference) -> Self {
        Padder { downstream, reference }
    }

    fn pad(&self, mut a: Assembly) -> Assembly {
        if a.matches_reference {
            return a;
        }
        let (Some(left), Some(right)) =
            (a.left_offset.is_present().then(|| a.left_offset.get()), a.right_offset.is_present().then(|| a.right_offset.get()))
        else {
            return a;
        };
        let ref_span_empty = right == left;
        if !a.seq.is_empty() && !ref_span_empty {
            return a;
        }

        if left > 0 {
            if let Some(prev_base) = self.reference.base_at((left - 1) as usize) {
                let mut bases = vec![prev_base];
                bases.extend_from_slice(a.seq.bases());
                a.seq = crate::dna::Seq::from_bases(bases);
                a.left_offset = crate::assembly::OptionalOffset::some(left - 1);
            }
        } else if let Some(next_base) = self.reference.base_at(right as usize) {
            let mut bases = a.seq.bases().to_vec();
            bases.push(next_base);
            a.seq = crate::dna::Seq::from_bases(bases);
            a.right_offset = crate::assembly::OptionalOffset::some(right + 1);
        }
        a
    }
}

impl<'a, S: Stage> Stage for Padder<'a, S> {
    fn expected_order(&self) -> ExpectedOrder {
        self.downstream.expected_order()
    }

    fn add(&mut self, a: Assembly) {
        self.downstream.add(self.pad(a));
    }

    fn flush(&mut self) {
        self.downstream.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::OptionalOffset;
    use crate::testutil::tseq_reference;
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
    fn normalizer_shifts_a_deletion_to_its_leftmost_position() {
        let reference = tseq_reference("aaaaaaaa");
        // An assembly spanning [4,5) with empty seq, over a homopolymer
        // run, should shift as far left as the run allows (bounding base
        // equal throughout means it walks to offset 0).
        let a = Assembly::new(OptionalOffset::some(4), OptionalOffset::some(5), crate::dna::Seq::new());
        let mut norm = Normalizer::new(Collector(Vec::new()), &reference);
        norm.add(a);
        norm.flush();
        assert_eq!(norm.downstream.0[0].left_offset.get(), 0);
    }

    #[test]
    fn padder_adds_a_left_base_to_an_empty_insertion_span() {
        let reference = tseq_reference("abcdefgh");
        let a = Assembly::new(OptionalOffset::some(4), OptionalOffset::some(4), crate::dna::Seq::new());
        let mut padder = Padder::new(Collector(Vec::new()), &reference);
        padder.add(a);
        padder.flush();
        let padded = &padder.downstream.0[0];
        assert_eq!(padded.left_offset.get(), 3);
        assert_eq!(padded.seq.len(), 1);
    }
}
