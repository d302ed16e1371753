//! LTL formulas: parsing, normal forms and realizability simplification.

use std::fmt;

use log::debug;

/// The status of an atomic proposition after realizability simplification.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AtomicPropositionStatus {
    /// The proposition is used in the formula.
    Used,
    /// The proposition does not appear in the formula.
    Unused,
    /// The proposition may be replaced with true.
    True,
    /// The proposition may be replaced with false.
    False,
}

/// An LTL formula over indexed atomic propositions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    True,
    False,
    Ap(usize),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Biconditional(Box<Formula>, Box<Formula>),
    Next(Box<Formula>),
    Finally(Box<Formula>),
    Globally(Box<Formula>),
    Until(Box<Formula>, Box<Formula>),
    Release(Box<Formula>, Box<Formula>),
}

/// An error which can occur while parsing an LTL formula.
#[derive(Debug, thiserror::Error)]
#[error("could not parse formula: {msg} (at offset {offset})")]
pub struct ParseError {
    msg: String,
    offset: usize,
}

impl ParseError {
    fn new(msg: impl Into<String>, offset: usize) -> Self {
        Self {
            msg: msg.into(),
            offset,
        }
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    aps: &'a [&'a str],
}

impl<'a> Parser<'a> {
    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.input[self.pos..].starts_with(token.as_bytes()) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn parse_biconditional(&mut self) -> Result<Formula, ParseError> {
        let lhs = self.parse_implication()?;
        if self.eat("<->") || self.eat("<=>") {
            let rhs = self.parse_biconditional()?;
            Ok(Formula::Biconditional(Box::new(lhs), Box::new(rhs)))
        } else {
            Ok(lhs)
        }
    }

    fn parse_implication(&mut self) -> Result<Formula, ParseError> {
        let lhs = self.parse_disjunction()?;
        if self.eat("->") || self.eat("=>") {
            let rhs = self.parse_implication()?;
            Ok(Formula::Implies(Box::new(lhs), Box::new(rhs)))
        } else {
            Ok(lhs)
        }
    }

    fn parse_disjunction(&mut self) -> Result<Formula, ParseError> {
        let mut operands = vec![self.parse_conjunction()?];
        while self.eat("||") || self.eat("|") || self.eat("\\/") {
            operands.push(self.parse_conjunction()?);
        }
        if operands.len() == 1 {
            Ok(operands.pop().unwrap())
        } else {
            Ok(Formula::Or(operands))
        }
    }

    fn parse_conjunction(&mut self) -> Result<Formula, ParseError> {
        let mut operands = vec![self.parse_binary_temporal()?];
        while self.eat("&&") || self.eat("&") || self.eat("/\\") {
            operands.push(self.parse_binary_temporal()?);
        }
        if operands.len() == 1 {
            Ok(operands.pop().unwrap())
        } else {
            Ok(Formula::And(operands))
        }
    }

    fn parse_binary_temporal(&mut self) -> Result<Formula, ParseError> {
        let lhs = self.parse_unary()?;
        if self.eat_keyword("U") {
            let rhs = self.parse_binary_temporal()?;
            Ok(Formula::Until(Box::new(lhs), Box::new(rhs)))
        } else if self.eat_keyword("R") {
            let rhs = self.parse_binary_temporal()?;
            Ok(Formula::Release(Box::new(lhs), Box::new(rhs)))
        } else if self.eat_keyword("W") {
            // a W b = b R (a | b)
            let rhs = self.parse_binary_temporal()?;
            Ok(Formula::Release(
                Box::new(rhs.clone()),
                Box::new(Formula::Or(vec![lhs, rhs])),
            ))
        } else {
            Ok(lhs)
        }
    }

    /// Consumes a single-letter keyword, requiring that it is not the start
    /// of a longer identifier.
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        if self.input[self.pos..].starts_with(keyword.as_bytes()) {
            let next = self.input.get(self.pos + keyword.len());
            if !next.is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_') {
                self.pos += keyword.len();
                return true;
            }
        }
        false
    }

    fn parse_unary(&mut self) -> Result<Formula, ParseError> {
        if self.eat("!") || self.eat("~") {
            Ok(Formula::Not(Box::new(self.parse_unary()?)))
        } else if self.eat_keyword("X") {
            Ok(Formula::Next(Box::new(self.parse_unary()?)))
        } else if self.eat_keyword("F") {
            Ok(Formula::Finally(Box::new(self.parse_unary()?)))
        } else if self.eat_keyword("G") {
            Ok(Formula::Globally(Box::new(self.parse_unary()?)))
        } else {
            self.parse_atom()
        }
    }

    fn parse_atom(&mut self) -> Result<Formula, ParseError> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let inner = self.parse_biconditional()?;
                if self.eat(")") {
                    Ok(inner)
                } else {
                    Err(ParseError::new("expected ')'", self.pos))
                }
            }
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                let start = self.pos;
                while self
                    .input
                    .get(self.pos)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_')
                {
                    self.pos += 1;
                }
                let name = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
                match name {
                    "true" | "TRUE" => Ok(Formula::True),
                    "false" | "FALSE" => Ok(Formula::False),
                    _ => match self.aps.iter().position(|ap| *ap == name) {
                        Some(index) => Ok(Formula::Ap(index)),
                        None => Err(ParseError::new(
                            format!("unknown atomic proposition '{}'", name),
                            start,
                        )),
                    },
                }
            }
            Some(b'1') => {
                self.pos += 1;
                Ok(Formula::True)
            }
            Some(b'0') => {
                self.pos += 1;
                Ok(Formula::False)
            }
            Some(c) => Err(ParseError::new(
                format!("unexpected character '{}'", c as char),
                self.pos,
            )),
            None => Err(ParseError::new("unexpected end of input", self.pos)),
        }
    }
}

/// Parses an LTL formula over the given atomic propositions.
pub fn parse(text: &str, aps: &[&str]) -> Result<Formula, ParseError> {
    let mut parser = Parser {
        input: text.as_bytes(),
        pos: 0,
        aps,
    };
    let formula = parser.parse_biconditional()?;
    parser.skip_whitespace();
    if parser.pos != parser.input.len() {
        Err(ParseError::new("trailing input", parser.pos))
    } else {
        Ok(formula)
    }
}

impl Formula {
    /// Rewrites the formula into negation normal form: negations occur only
    /// in front of atomic propositions, implications are expanded, and
    /// biconditionals are kept (with negations pushed into one side).
    pub fn nnf(&self) -> Formula {
        self.nnf_rec(false)
    }

    fn nnf_rec(&self, negate: bool) -> Formula {
        match self {
            Formula::True => {
                if negate {
                    Formula::False
                } else {
                    Formula::True
                }
            }
            Formula::False => {
                if negate {
                    Formula::True
                } else {
                    Formula::False
                }
            }
            Formula::Ap(index) => {
                if negate {
                    Formula::Not(Box::new(Formula::Ap(*index)))
                } else {
                    Formula::Ap(*index)
                }
            }
            Formula::Not(inner) => inner.nnf_rec(!negate),
            Formula::And(operands) => {
                let inner = operands.iter().map(|f| f.nnf_rec(negate)).collect();
                if negate {
                    Formula::Or(inner)
                } else {
                    Formula::And(inner)
                }
            }
            Formula::Or(operands) => {
                let inner = operands.iter().map(|f| f.nnf_rec(negate)).collect();
                if negate {
                    Formula::And(inner)
                } else {
                    Formula::Or(inner)
                }
            }
            Formula::Implies(lhs, rhs) => {
                // a -> b = !a | b
                if negate {
                    Formula::And(vec![lhs.nnf_rec(false), rhs.nnf_rec(true)])
                } else {
                    Formula::Or(vec![lhs.nnf_rec(true), rhs.nnf_rec(false)])
                }
            }
            Formula::Biconditional(lhs, rhs) => Formula::Biconditional(
                Box::new(lhs.nnf_rec(false)),
                Box::new(rhs.nnf_rec(negate)),
            ),
            Formula::Next(inner) => Formula::Next(Box::new(inner.nnf_rec(negate))),
            Formula::Finally(inner) => {
                if negate {
                    Formula::Globally(Box::new(inner.nnf_rec(true)))
                } else {
                    Formula::Finally(Box::new(inner.nnf_rec(false)))
                }
            }
            Formula::Globally(inner) => {
                if negate {
                    Formula::Finally(Box::new(inner.nnf_rec(true)))
                } else {
                    Formula::Globally(Box::new(inner.nnf_rec(false)))
                }
            }
            Formula::Until(lhs, rhs) => {
                if negate {
                    Formula::Release(Box::new(lhs.nnf_rec(true)), Box::new(rhs.nnf_rec(true)))
                } else {
                    Formula::Until(Box::new(lhs.nnf_rec(false)), Box::new(rhs.nnf_rec(false)))
                }
            }
            Formula::Release(lhs, rhs) => {
                if negate {
                    Formula::Until(Box::new(lhs.nnf_rec(true)), Box::new(rhs.nnf_rec(true)))
                } else {
                    Formula::Release(Box::new(lhs.nnf_rec(false)), Box::new(rhs.nnf_rec(false)))
                }
            }
        }
    }

    /// Records in `polarity` how each atomic proposition occurs:
    /// bit 0 for positive, bit 1 for negative occurrences. Operands of a
    /// biconditional count as both.
    fn polarities(&self, negate: bool, both: bool, polarity: &mut [u8]) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Ap(index) => {
                if both {
                    polarity[*index] |= 3;
                } else if negate {
                    polarity[*index] |= 2;
                } else {
                    polarity[*index] |= 1;
                }
            }
            Formula::Not(inner) => inner.polarities(!negate, both, polarity),
            Formula::And(operands) | Formula::Or(operands) => {
                for operand in operands {
                    operand.polarities(negate, both, polarity);
                }
            }
            Formula::Implies(lhs, rhs) => {
                lhs.polarities(!negate, both, polarity);
                rhs.polarities(negate, both, polarity);
            }
            Formula::Biconditional(lhs, rhs) => {
                lhs.polarities(negate, true, polarity);
                rhs.polarities(negate, true, polarity);
            }
            Formula::Next(inner) | Formula::Finally(inner) | Formula::Globally(inner) => {
                inner.polarities(negate, both, polarity)
            }
            Formula::Until(lhs, rhs) | Formula::Release(lhs, rhs) => {
                lhs.polarities(negate, both, polarity);
                rhs.polarities(negate, both, polarity);
            }
        }
    }

    /// Replaces an atomic proposition by a constant.
    fn substitute(&self, ap: usize, value: bool) -> Formula {
        let constant = if value { Formula::True } else { Formula::False };
        match self {
            Formula::True | Formula::False => self.clone(),
            Formula::Ap(index) => {
                if *index == ap {
                    constant
                } else {
                    self.clone()
                }
            }
            Formula::Not(inner) => Formula::Not(Box::new(inner.substitute(ap, value))),
            Formula::And(operands) => {
                Formula::And(operands.iter().map(|f| f.substitute(ap, value)).collect())
            }
            Formula::Or(operands) => {
                Formula::Or(operands.iter().map(|f| f.substitute(ap, value)).collect())
            }
            Formula::Implies(lhs, rhs) => Formula::Implies(
                Box::new(lhs.substitute(ap, value)),
                Box::new(rhs.substitute(ap, value)),
            ),
            Formula::Biconditional(lhs, rhs) => Formula::Biconditional(
                Box::new(lhs.substitute(ap, value)),
                Box::new(rhs.substitute(ap, value)),
            ),
            Formula::Next(inner) => Formula::Next(Box::new(inner.substitute(ap, value))),
            Formula::Finally(inner) => Formula::Finally(Box::new(inner.substitute(ap, value))),
            Formula::Globally(inner) => Formula::Globally(Box::new(inner.substitute(ap, value))),
            Formula::Until(lhs, rhs) => Formula::Until(
                Box::new(lhs.substitute(ap, value)),
                Box::new(rhs.substitute(ap, value)),
            ),
            Formula::Release(lhs, rhs) => Formula::Release(
                Box::new(lhs.substitute(ap, value)),
                Box::new(rhs.substitute(ap, value)),
            ),
        }
    }

    /// Propagates boolean and temporal constants.
    fn simplify_constants(&self) -> Formula {
        use Formula::*;
        match self {
            True | False | Ap(_) => self.clone(),
            Not(inner) => match inner.simplify_constants() {
                True => False,
                False => True,
                simplified => Not(Box::new(simplified)),
            },
            And(operands) => {
                let mut simplified = Vec::new();
                for operand in operands {
                    match operand.simplify_constants() {
                        True => {}
                        False => return False,
                        f => simplified.push(f),
                    }
                }
                match simplified.len() {
                    0 => True,
                    1 => simplified.pop().unwrap(),
                    _ => And(simplified),
                }
            }
            Or(operands) => {
                let mut simplified = Vec::new();
                for operand in operands {
                    match operand.simplify_constants() {
                        False => {}
                        True => return True,
                        f => simplified.push(f),
                    }
                }
                match simplified.len() {
                    0 => False,
                    1 => simplified.pop().unwrap(),
                    _ => Or(simplified),
                }
            }
            Implies(lhs, rhs) => match (lhs.simplify_constants(), rhs.simplify_constants()) {
                (False, _) | (_, True) => True,
                (True, rhs) => rhs,
                (lhs, False) => Not(Box::new(lhs)).simplify_constants(),
                (lhs, rhs) => Implies(Box::new(lhs), Box::new(rhs)),
            },
            Biconditional(lhs, rhs) => match (lhs.simplify_constants(), rhs.simplify_constants()) {
                (True, rhs) => rhs,
                (lhs, True) => lhs,
                (False, rhs) => Not(Box::new(rhs)).simplify_constants(),
                (lhs, False) => Not(Box::new(lhs)).simplify_constants(),
                (lhs, rhs) => Biconditional(Box::new(lhs), Box::new(rhs)),
            },
            Next(inner) => match inner.simplify_constants() {
                True => True,
                False => False,
                f => Next(Box::new(f)),
            },
            Finally(inner) => match inner.simplify_constants() {
                True => True,
                False => False,
                f => Finally(Box::new(f)),
            },
            Globally(inner) => match inner.simplify_constants() {
                True => True,
                False => False,
                f => Globally(Box::new(f)),
            },
            Until(lhs, rhs) => match (lhs.simplify_constants(), rhs.simplify_constants()) {
                (_, True) => True,
                (_, False) => False,
                (True, rhs) => Finally(Box::new(rhs)),
                (False, rhs) => rhs,
                (lhs, rhs) => Until(Box::new(lhs), Box::new(rhs)),
            },
            Release(lhs, rhs) => match (lhs.simplify_constants(), rhs.simplify_constants()) {
                (_, False) => False,
                (_, True) => True,
                (True, rhs) => rhs,
                (False, rhs) => Globally(Box::new(rhs)),
                (lhs, rhs) => Release(Box::new(lhs), Box::new(rhs)),
            },
        }
    }

    /// Simplifies the formula for realizability: propositions of pure
    /// polarity are replaced by the constant the owning player would fix them
    /// to. Inputs are resolved pessimistically (the environment minimizes
    /// satisfaction), outputs optimistically.
    ///
    /// Returns the simplified formula and the status of each proposition.
    pub fn simplify_realizability(
        &self,
        num_inputs: usize,
        num_aps: usize,
    ) -> (Formula, Vec<AtomicPropositionStatus>) {
        let mut statuses = vec![AtomicPropositionStatus::Unused; num_aps];
        let mut formula = self.simplify_constants();
        loop {
            let mut polarity = vec![0_u8; num_aps];
            formula.polarities(false, false, &mut polarity);
            let mut change = false;
            for ap in 0..num_aps {
                let status = match polarity[ap] {
                    0 => continue,
                    1 if ap < num_inputs => AtomicPropositionStatus::False,
                    1 => AtomicPropositionStatus::True,
                    2 if ap < num_inputs => AtomicPropositionStatus::True,
                    2 => AtomicPropositionStatus::False,
                    _ => {
                        statuses[ap] = AtomicPropositionStatus::Used;
                        continue;
                    }
                };
                statuses[ap] = status;
                formula = formula
                    .substitute(ap, status == AtomicPropositionStatus::True)
                    .simplify_constants();
                change = true;
            }
            if !change {
                break;
            }
            // a substitution may have removed the last remaining occurrence
            // of another proposition, so its recorded status is stale
            for status in statuses.iter_mut() {
                if *status != AtomicPropositionStatus::Used {
                    continue;
                }
                *status = AtomicPropositionStatus::Unused;
            }
            let mut polarity = vec![0_u8; num_aps];
            formula.polarities(false, false, &mut polarity);
            for ap in 0..num_aps {
                if polarity[ap] != 0 {
                    statuses[ap] = AtomicPropositionStatus::Used;
                }
            }
        }
        debug!("simplified formula: {:?}", formula);
        (formula, statuses)
    }
}

/// Transforms an LTLf formula into an LTL formula over infinite words by
/// introducing the fresh `alive` proposition, which must be appended to the
/// output propositions by the caller.
pub fn from_ltlf(formula: &Formula, alive: usize) -> Formula {
    fn transform(formula: &Formula, alive: usize) -> Formula {
        let t = |f: &Formula| transform(f, alive);
        match formula {
            Formula::True | Formula::False | Formula::Ap(_) => formula.clone(),
            Formula::Not(inner) => Formula::Not(Box::new(t(inner))),
            Formula::And(operands) => Formula::And(operands.iter().map(t).collect()),
            Formula::Or(operands) => Formula::Or(operands.iter().map(t).collect()),
            Formula::Implies(lhs, rhs) => {
                Formula::Implies(Box::new(t(lhs)), Box::new(t(rhs)))
            }
            Formula::Biconditional(lhs, rhs) => {
                Formula::Biconditional(Box::new(t(lhs)), Box::new(t(rhs)))
            }
            Formula::Next(inner) => Formula::Next(Box::new(Formula::And(vec![
                Formula::Ap(alive),
                t(inner),
            ]))),
            Formula::Finally(inner) => Formula::Finally(Box::new(Formula::And(vec![
                Formula::Ap(alive),
                t(inner),
            ]))),
            Formula::Globally(inner) => Formula::Globally(Box::new(Formula::Or(vec![
                Formula::Not(Box::new(Formula::Ap(alive))),
                t(inner),
            ]))),
            Formula::Until(lhs, rhs) => Formula::Until(
                Box::new(t(lhs)),
                Box::new(Formula::And(vec![Formula::Ap(alive), t(rhs)])),
            ),
            Formula::Release(lhs, rhs) => Formula::Not(Box::new(Formula::Until(
                Box::new(Formula::Not(Box::new(t(lhs)))),
                Box::new(Formula::And(vec![
                    Formula::Ap(alive),
                    Formula::Not(Box::new(t(rhs))),
                ])),
            ))),
        }
    }

    Formula::And(vec![
        Formula::Ap(alive),
        Formula::Until(
            Box::new(Formula::Ap(alive)),
            Box::new(Formula::Globally(Box::new(Formula::Not(Box::new(
                Formula::Ap(alive),
            ))))),
        ),
        transform(formula, alive),
    ])
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => write!(f, "true"),
            Formula::False => write!(f, "false"),
            Formula::Ap(index) => write!(f, "p{}", index),
            Formula::Not(inner) => write!(f, "!{}", inner),
            Formula::And(operands) => {
                write!(f, "(")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")
            }
            Formula::Or(operands) => {
                write!(f, "(")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")
            }
            Formula::Implies(lhs, rhs) => write!(f, "({} -> {})", lhs, rhs),
            Formula::Biconditional(lhs, rhs) => write!(f, "({} <-> {})", lhs, rhs),
            Formula::Next(inner) => write!(f, "X {}", inner),
            Formula::Finally(inner) => write!(f, "F {}", inner),
            Formula::Globally(inner) => write!(f, "G {}", inner),
            Formula::Until(lhs, rhs) => write!(f, "({} U {})", lhs, rhs),
            Formula::Release(lhs, rhs) => write!(f, "({} R {})", lhs, rhs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_precedence() {
        let aps = ["a", "b", "c"];
        let f = parse("a -> b & c", &aps).unwrap();
        assert_eq!(
            f,
            Formula::Implies(
                Box::new(Formula::Ap(0)),
                Box::new(Formula::And(vec![Formula::Ap(1), Formula::Ap(2)]))
            )
        );

        let g = parse("G F a", &aps).unwrap();
        assert_eq!(
            g,
            Formula::Globally(Box::new(Formula::Finally(Box::new(Formula::Ap(0)))))
        );
    }

    #[test]
    fn keyword_is_not_identifier_prefix() {
        let aps = ["Grant", "r"];
        let f = parse("r U Grant", &aps).unwrap();
        assert_eq!(
            f,
            Formula::Until(Box::new(Formula::Ap(1)), Box::new(Formula::Ap(0)))
        );
    }

    #[test]
    fn rejects_unknown_proposition() {
        assert!(parse("a & d", &["a", "b"]).is_err());
        assert!(parse("a &", &["a"]).is_err());
        assert!(parse("a b", &["a", "b"]).is_err());
    }

    #[test]
    fn nnf_pushes_negations() {
        let aps = ["a", "b"];
        let f = parse("!(G F a)", &aps).unwrap().nnf();
        assert_eq!(
            f,
            Formula::Finally(Box::new(Formula::Globally(Box::new(Formula::Not(
                Box::new(Formula::Ap(0))
            )))))
        );

        let g = parse("!(a U b)", &aps).unwrap().nnf();
        assert_eq!(
            g,
            Formula::Release(
                Box::new(Formula::Not(Box::new(Formula::Ap(0)))),
                Box::new(Formula::Not(Box::new(Formula::Ap(1))))
            )
        );
    }

    #[test]
    fn simplify_fixes_pure_outputs() {
        // p is an output occurring only positively: fixed to true
        let aps = ["p"];
        let f = parse("G p", &aps).unwrap();
        let (simplified, statuses) = f.simplify_realizability(0, 1);
        assert_eq!(simplified, Formula::True);
        assert_eq!(statuses, vec![AtomicPropositionStatus::True]);
    }

    #[test]
    fn simplify_fixes_pure_inputs() {
        // r is an input occurring only negatively: the environment would
        // keep it true, after which g is an output fixed to true
        let aps = ["r", "g"];
        let f = parse("G (r -> F g)", &aps).unwrap();
        let (simplified, statuses) = f.simplify_realizability(1, 2);
        assert_eq!(simplified, Formula::True);
        assert_eq!(statuses[0], AtomicPropositionStatus::True);
        assert_eq!(statuses[1], AtomicPropositionStatus::True);
    }

    #[test]
    fn simplify_keeps_mixed_polarity() {
        let aps = ["r", "g"];
        let f = parse("(G F r) <-> (G F g)", &aps).unwrap();
        let (simplified, statuses) = f.simplify_realizability(1, 2);
        assert_eq!(simplified, f);
        assert_eq!(
            statuses,
            vec![AtomicPropositionStatus::Used, AtomicPropositionStatus::Used]
        );
    }
}
