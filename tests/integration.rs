//! Integration tests running the full pipeline on small specifications,
//! checking realizability verdicts and simulating extracted controllers.

use arbiter::options::{ExplorationStrategy, OutputFormat, Simplification, SynthesisOptions};
use arbiter::{
    synthesize_with, Controller, Error,
    Status::{self, Realizable, Unrealizable},
};

/// Options that disable formula simplification so that the game pipeline is
/// actually exercised.
fn game_options() -> SynthesisOptions {
    SynthesisOptions {
        ltl_simplification: Simplification::None,
        ..SynthesisOptions::default()
    }
}

/// Synthesize the given specification, only testing realizability, and
/// check the returned status against the expected status.
fn verify_realizability(ltl: &str, ins: &[&str], outs: &[&str], expected_status: Status) {
    verify_realizability_with(
        ltl,
        ins,
        outs,
        expected_status,
        &SynthesisOptions {
            only_realizability: true,
            ..game_options()
        },
    );
}

fn verify_realizability_with(
    ltl: &str,
    ins: &[&str],
    outs: &[&str],
    expected_status: Status,
    options: &SynthesisOptions,
) {
    let result = synthesize_with(ltl, ins, outs, options).expect("synthesis failed");
    assert_eq!(result.status(), expected_status);
}

/// Synthesize a machine controller in KISS format and return the result.
fn synthesize_machine(
    ltl: &str,
    ins: &[&str],
    outs: &[&str],
    options: &SynthesisOptions,
) -> arbiter::SynthesisResult {
    let options = SynthesisOptions {
        output_format: OutputFormat::Kiss,
        ..options.clone()
    };
    synthesize_with(ltl, ins, outs, &options).expect("synthesis failed")
}

macro_rules! realizability_tests {
    ($($name:ident: ($ltl:expr, $ins:expr, $outs:expr, $expected_status:expr),)*) => {
        mod realizability {
            use super::*;
            $(
                #[test]
                fn $name() {
                    verify_realizability($ltl, $ins, $outs, $expected_status);
                }
            )*
        }

        mod realizability_pq {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        only_realizability: true,
                        exploration_strategy: ExplorationStrategy::Pq,
                        ..game_options()
                    };
                    verify_realizability_with($ltl, $ins, $outs, $expected_status, &options);
                }
            )*
        }

        mod realizability_sequential {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        only_realizability: true,
                        onthefly: false,
                        clear_queue: false,
                        ..game_options()
                    };
                    verify_realizability_with($ltl, $ins, $outs, $expected_status, &options);
                }
            )*
        }

        mod realizability_simplified {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        only_realizability: true,
                        ..SynthesisOptions::default()
                    };
                    verify_realizability_with($ltl, $ins, $outs, $expected_status, &options);
                }
            )*
        }

        mod machines {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let result =
                        synthesize_machine($ltl, $ins, $outs, &game_options());
                    assert_eq!(result.status(), $expected_status);
                    match result.controller() {
                        Some(Controller::Machine(machine)) => {
                            assert!(machine.num_states() > 0);
                            // the kiss output must at least carry the header
                            let text = machine.to_string();
                            assert!(text.contains(".s "));
                        }
                        _ => panic!("no machine controller produced"),
                    }
                }
            )*
        }
    }
}

realizability_tests! {
    constant_output: ("G p", &[], &["p"], Realizable),
    unforceable_input: ("G F r", &["r"], &[], Unrealizable),
    buchi_implication: ("(G F r) -> (G F g)", &["r"], &["g"], Realizable),
    request_response: ("G (r -> F g)", &["r"], &["g"], Realizable),
    buchi_biconditional: ("(G F r) <-> (G F g)", &["r"], &["g"], Realizable),
    disjoint_conjunction: ("(G x) & (G F y)", &[], &["x", "y"], Realizable),
    conjunction_with_losing_part: ("(G F g) & (F G r)", &["r"], &["g"], Unrealizable),
    until_release: ("(g U r) & (G g2)", &["r"], &["g", "g2"], Unrealizable),
    eventual_grant: ("F g", &["r"], &["g"], Realizable),
    safety_violation: ("G (r -> g)", &["r", "g"], &[], Unrealizable),
}

mod scenarios {
    use super::*;

    /// Scenario: `G p` has a one-state Mealy machine and an AIGER circuit
    /// with zero latches and one constant-true output.
    #[test]
    fn constant_output_machine_and_circuit() {
        let result = synthesize_machine("G p", &[], &["p"], &game_options());
        assert_eq!(result.status(), Realizable);
        let Some(Controller::Machine(machine)) = result.controller() else {
            panic!("no machine controller produced");
        };
        assert_eq!(machine.num_states(), 1);
        // the machine emits p in every step
        for output in machine.simulate(&[0, 0, 0, 0]) {
            assert_eq!(output.number & 1, 1);
        }

        let options = SynthesisOptions {
            output_format: OutputFormat::Aag,
            ..game_options()
        };
        let result = synthesize_with("G p", &[], &["p"], &options).unwrap();
        let Some(Controller::Aiger(circuit)) = result.controller() else {
            panic!("no aiger controller produced");
        };
        assert_eq!(circuit.num_latches(), 0);
        let text = circuit.to_string();
        let header: Vec<&str> = text.lines().next().unwrap().split(' ').collect();
        // aag M I L O A with no inputs, no latches and one output
        assert_eq!(header[2], "0");
        assert_eq!(header[3], "0");
        assert_eq!(header[4], "1");
        // the single output is the constant true literal
        assert_eq!(text.lines().nth(1).unwrap(), "1");
    }

    /// Scenario: `G F r` over an input is unrealizable and the Moore
    /// machine for the environment keeps the request low forever.
    #[test]
    fn unforceable_input_moore_machine() {
        let result = synthesize_machine("G F r", &["r"], &[], &game_options());
        assert_eq!(result.status(), Unrealizable);
        let Some(Controller::Machine(machine)) = result.controller() else {
            panic!("no machine controller produced");
        };
        // the machine outputs the environment inputs: r stays false
        for output in machine.simulate(&[0, 0, 0, 0, 0]) {
            assert_eq!(output.number & 1, 0);
        }
    }

    /// Scenario: `G (r -> F g)` gets a machine that eventually raises `g`
    /// after every request.
    #[test]
    fn request_response_round_trip() {
        let result = synthesize_machine("G (r -> F g)", &["r"], &["g"], &game_options());
        assert_eq!(result.status(), Realizable);
        let Some(Controller::Machine(machine)) = result.controller() else {
            panic!("no machine controller produced");
        };
        // request once, then wait long enough for any finite machine to
        // complete a full cycle
        let steps = 3 * machine.num_states() + 3;
        let mut inputs = vec![1_u64];
        inputs.extend(std::iter::repeat(0).take(steps));
        let outputs = machine.simulate(&inputs);
        assert!(
            outputs.iter().any(|output| output.number & 1 == 1),
            "no grant emitted after a request"
        );
    }

    /// Scenario: `(G F r) -> (G F g)` keeps granting when requests keep
    /// coming.
    #[test]
    fn buchi_implication_round_trip() {
        let result =
            synthesize_machine("(G F r) -> (G F g)", &["r"], &["g"], &game_options());
        assert_eq!(result.status(), Realizable);
        let Some(Controller::Machine(machine)) = result.controller() else {
            panic!("no machine controller produced");
        };
        // under constant requests, grants must recur: count them in the
        // second half of a run that is long enough to cycle
        let steps = 4 * (machine.num_states() + 1);
        let inputs = vec![1_u64; steps];
        let outputs = machine.simulate(&inputs);
        let grants = outputs[steps / 2..]
            .iter()
            .filter(|output| output.number & 1 == 1)
            .count();
        assert!(grants > 0, "grants do not recur under constant requests");
    }

    /// Scenario: a conjunction of sub-specifications over disjoint
    /// propositions is realizable iff both conjuncts are.
    #[test]
    fn conjunction_is_and_of_realizability() {
        verify_realizability("(G x) & (G F y)", &[], &["x", "y"], Realizable);
        verify_realizability("(G F g) & (G F r)", &["r"], &["g"], Unrealizable);
    }

    /// Scenario: an LTLf transformation with a conflicting proposition name
    /// must produce a configuration error, not a crash.
    #[test]
    fn ltlf_alive_conflict_is_config_error() {
        let options = SynthesisOptions {
            from_ltlf: Some("alive".to_string()),
            ..game_options()
        };
        let result = synthesize_with("F alive", &["alive"], &[], &options);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

mod output_formats {
    use super::*;

    #[test]
    fn parity_game_dump() {
        let options = SynthesisOptions {
            output_format: OutputFormat::Pg,
            ..game_options()
        };
        let result = synthesize_with("G (r -> F g)", &["r"], &["g"], &options).unwrap();
        assert_eq!(result.status(), Realizable);
        let Some(Controller::ParityGame(dump)) = result.controller() else {
            panic!("no parity game produced");
        };
        assert!(dump.starts_with("parity "));
        assert!(dump.contains("\"top\""));
    }

    #[test]
    fn dot_output_is_a_digraph() {
        let options = SynthesisOptions {
            output_format: OutputFormat::Dot,
            ..game_options()
        };
        let result = synthesize_with("G (r -> F g)", &["r"], &["g"], &options).unwrap();
        let Some(controller) = result.controller() else {
            panic!("no controller produced");
        };
        let mut out = Vec::new();
        controller.write(&mut out, OutputFormat::Dot).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("digraph"));
        assert!(text.contains("init -> 0"));
    }

    #[test]
    fn labelled_kiss_output() {
        let options = SynthesisOptions {
            output_format: OutputFormat::Kiss,
            labels: true,
            ..game_options()
        };
        let result = synthesize_with("G (r -> F g)", &["r"], &["g"], &options).unwrap();
        let Some(Controller::Machine(machine)) = result.controller() else {
            panic!("no machine controller produced");
        };
        assert!(machine.has_labels());
        let text = machine.to_string();
        // labelled states are rendered as value tuples
        assert!(text.contains(".r ("));
    }

    /// Writing a controller to a file must produce the same text as the
    /// in-memory rendering.
    #[test]
    fn controller_file_round_trip() {
        let options = SynthesisOptions {
            output_format: OutputFormat::Aag,
            ..game_options()
        };
        let result = synthesize_with("G (r -> F g)", &["r"], &["g"], &options).unwrap();
        let Some(controller) = result.controller() else {
            panic!("no controller produced");
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        controller.write(&mut file, OutputFormat::Aag).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("aag "));
        match controller {
            Controller::Aiger(circuit) => assert_eq!(text, circuit.to_string()),
            _ => panic!("no aiger controller produced"),
        }
    }

    #[test]
    fn aiger_circuit_for_response() {
        let options = SynthesisOptions {
            output_format: OutputFormat::Aag,
            ..game_options()
        };
        let result = synthesize_with("G (r -> F g)", &["r"], &["g"], &options).unwrap();
        let Some(Controller::Aiger(circuit)) = result.controller() else {
            panic!("no aiger controller produced");
        };
        let text = circuit.to_string();
        assert!(text.starts_with("aag "));
        assert!(text.contains("i0 r"));
        assert!(text.contains("o0 g"));
    }
}

mod errors {
    use super::*;

    #[test]
    fn unknown_proposition_is_parse_error() {
        let result = synthesize_with("G q", &[], &["p"], &game_options());
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn duplicate_proposition_is_config_error() {
        let result = synthesize_with("G p", &["p"], &["p"], &game_options());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn unsupported_formula_is_reported() {
        // overlapping alphabets in a temporal combination are outside the
        // built-in fragment
        let result = synthesize_with("(G F p) & (F G p)", &[], &["p"], &game_options());
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }
}
