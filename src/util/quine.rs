//! Quine-McCluskey prime implicants over cube covers.

use std::collections::HashMap;

use super::specseq::{Bits, SpecSeq};

/// Table of minterms and implicants, indexed by the number of unspecified
/// bits and the number of ones, then keyed by the unspecified mask and the
/// value. The boolean marks terms that have not been combined yet.
struct QuineTable<I: Bits> {
    size: usize,
    cells: Vec<Vec<HashMap<I, HashMap<I, bool>>>>,
}

fn compute_quine_table<I: Bits>(num_bits: u32, values: &[SpecSeq<I>]) -> QuineTable<I> {
    assert!(num_bits > 0);
    assert!(!values.is_empty());

    let rows = num_bits as usize + 1;
    let mut table = QuineTable {
        size: 1,
        cells: vec![vec![HashMap::new(); rows]; rows],
    };

    for value in values {
        let num_dontcares = value.unspecified.count_ones() as usize;
        let num_ones = value.number.count_ones() as usize;
        table.cells[num_dontcares][num_ones]
            .entry(value.unspecified)
            .or_default()
            .insert(value.number, true);
        table.size = table.size.max(num_dontcares + 1);
    }

    // Two terms combine when their unspecified masks agree, their one-counts
    // differ by exactly one, and their values differ in a single bit.
    let mut new_value = true;
    let mut cur_row = 0;
    while new_value || cur_row < table.size {
        new_value = false;
        for i in 0..rows - 1 {
            let (lhs_cells, rest) = table.cells[cur_row].split_at_mut(i + 1);
            let lhs_cell = &mut lhs_cells[i];
            let rhs_cell = &mut rest[0];
            let mut combined = Vec::new();
            for (&dontcares, lhs_numbers) in lhs_cell.iter_mut() {
                if let Some(rhs_numbers) = rhs_cell.get_mut(&dontcares) {
                    for (&lhs_number, lhs_alive) in lhs_numbers.iter_mut() {
                        for (&rhs_number, rhs_alive) in rhs_numbers.iter_mut() {
                            let diff = lhs_number ^ rhs_number;
                            if diff & diff.wrapping_sub(I::ONE) == I::ZERO {
                                combined.push((diff | dontcares, lhs_number & rhs_number));
                                *lhs_alive = false;
                                *rhs_alive = false;
                                new_value = true;
                            }
                        }
                    }
                }
            }
            for (dontcares, number) in combined {
                table.cells[cur_row + 1][i]
                    .entry(dontcares)
                    .or_default()
                    .insert(number, true);
            }
        }
        cur_row += 1;
    }
    table.size = cur_row;
    table
}

/// Computes the prime implicants of the given cube cover.
///
/// The input cubes are assumed to be pairwise distinct.
pub fn prime_implicants<I: Bits>(num_bits: u32, values: &[SpecSeq<I>]) -> Vec<SpecSeq<I>> {
    if values.len() == 1 {
        return vec![values[0]];
    }
    if num_bits > 0
        && values.iter().all(|v| v.is_fully_specified())
        && values.len() == 1usize << num_bits
    {
        return vec![SpecSeq::any(num_bits)];
    }

    let table = compute_quine_table(num_bits, values);

    let mut implicants = Vec::new();
    for s in 0..table.size {
        for cell in &table.cells[s] {
            for (&dontcares, numbers) in cell {
                for (&number, &alive) in numbers {
                    if alive {
                        implicants.push(SpecSeq::with_unspecified(number, dontcares));
                    }
                }
            }
        }
    }
    implicants.sort();
    implicants
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(number: u32, unspecified: u32) -> SpecSeq<u32> {
        SpecSeq::with_unspecified(number, unspecified)
    }

    #[test]
    fn merges_adjacent_minterms() {
        // f = {00, 01} over two bits collapses to -0? No: bit 0 varies,
        // so {00, 01} (values 0 and 1) collapses to 0- in LSB-first terms.
        let cover = vec![seq(0b00, 0), seq(0b01, 0)];
        let primes = prime_implicants(2, &cover);
        assert_eq!(primes, vec![seq(0b00, 0b01)]);
    }

    #[test]
    fn full_cover_is_true() {
        let cover = vec![seq(0, 0), seq(1, 0), seq(2, 0), seq(3, 0)];
        let primes = prime_implicants(2, &cover);
        assert_eq!(primes, vec![SpecSeq::any(2)]);
    }

    #[test]
    fn classic_example() {
        // f(b1, b0) = {01, 10, 11}: primes are 1- and -1.
        let cover = vec![seq(0b01, 0), seq(0b10, 0), seq(0b11, 0)];
        let primes = prime_implicants(2, &cover);
        assert_eq!(primes, vec![seq(0b01, 0b10), seq(0b10, 0b01)]);
    }
}
