use std::fmt;
use std::str::FromStr;

use snafu::{OptionExt, Snafu};

/// Academic subject the assistant answers for.
///
/// The set is closed; exactly one subject is active in a session at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Subject {
    #[default]
    Algebra,
    History,
    Physics,
    Chemistry,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SubjectParseError {
    #[snafu(display("unknown subject '{raw}'"))]
    Unknown { stage: &'static str, raw: String },
}

impl Subject {
    /// Every subject in sidebar order.
    pub const ALL: [Subject; 4] = [
        Subject::Algebra,
        Subject::History,
        Subject::Physics,
        Subject::Chemistry,
    ];

    /// Stable lowercase identifier used in settings and logs.
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Algebra => "algebra",
            Self::History => "history",
            Self::Physics => "physics",
            Self::Chemistry => "chemistry",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Algebra => "Algebra",
            Self::History => "History",
            Self::Physics => "Physics",
            Self::Chemistry => "Chemistry",
        }
    }

    pub const fn tagline(self) -> &'static str {
        match self {
            Self::Algebra => "Equations, functions, proofs",
            Self::History => "Dates, causes, essays",
            Self::Physics => "Problems with units and formulas",
            Self::Chemistry => "Reactions, moles, balancing",
        }
    }

    /// Tutor persona sent to the backend as the request preamble.
    pub const fn system_instruction(self) -> &'static str {
        match self {
            Self::Algebra => {
                "You are AbramAI, a patient algebra tutor for school students. \
                 Solve the task step by step the way a strong student would write it in a \
                 notebook: state what is given, show every transformation on its own line, \
                 and finish with a clearly marked answer. Use plain notation, no LaTeX."
            }
            Self::History => {
                "You are AbramAI, a history tutor for school students. Answer with a \
                 concise, well-structured summary: key dates, causes, consequences and the \
                 people involved. When asked for an essay or notes, write them in a natural \
                 student voice that can be copied into a notebook."
            }
            Self::Physics => {
                "You are AbramAI, a physics tutor for school students. Write solutions in \
                 the classic school format: Given, Find, Solution, Answer. Convert units to \
                 SI, name every formula before using it and keep the arithmetic visible."
            }
            Self::Chemistry => {
                "You are AbramAI, a chemistry tutor for school students. Balance every \
                 equation you write, show molar-mass and amount-of-substance calculations \
                 explicitly, and end with a short, clearly marked answer."
            }
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Subject {
    type Err = SubjectParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim();

        Self::ALL
            .into_iter()
            .find(|subject| {
                subject.slug().eq_ignore_ascii_case(needle)
                    || subject.display_name().eq_ignore_ascii_case(needle)
            })
            .context(UnknownSnafu {
                stage: "parse-subject",
                raw,
            })
    }
}
