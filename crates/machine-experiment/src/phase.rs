//! Phase controller: the fixed forward-only sequence of experiment phases.
//!
//! Owns all phase-local counters (budgets, trial counters, question and
//! round indices) and decides transitions. It communicates with the
//! presentation layer through `Directive` values so a missing collaborator
//! degrades to a logged no-op without corrupting any counter. No phase is
//! ever revisited.

use tracing::warn;

use crate::narration::{CueKind, NarrationCue};
use crate::outcome::OutcomeMode;
use crate::record::TrialTag;

/// The experiment phases, in their fixed forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Demo,
    Comprehension,
    ExtraSmall,
    Question,
    Lightness,
    VerbalQuestion,
    Exploration,
    Terminal,
}

impl Phase {
    /// Label recorded in trial data: phase name with its first letter
    /// capitalized.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Demo => "Demo",
            Phase::Comprehension => "Comprehension",
            Phase::ExtraSmall => "Extrasmall",
            Phase::Question => "Question",
            Phase::Lightness => "Lightness",
            Phase::VerbalQuestion => "Verbalquestion",
            Phase::Exploration => "Exploration",
            Phase::Terminal => "Terminal",
        }
    }

    /// Position in the fixed sequence.
    pub fn order(self) -> u8 {
        match self {
            Phase::Demo => 0,
            Phase::Comprehension => 1,
            Phase::ExtraSmall => 2,
            Phase::Question => 3,
            Phase::Lightness => 4,
            Phase::VerbalQuestion => 5,
            Phase::Exploration => 6,
            Phase::Terminal => 7,
        }
    }

    /// Outcome family produced by drops during this phase.
    pub fn outcome_mode(self) -> OutcomeMode {
        match self {
            Phase::Lightness => OutcomeMode::Brightness,
            _ => OutcomeMode::Star,
        }
    }
}

pub const DEMO_INSTRUCTIONS: &str = "You are an elf in a star factory. The star factory has three machines. Each machine has three slots that make stars bigger or smaller. You will now watch the stars go into the different slots. Notice what happens to the stars.";

pub const COMPREHENSION_QUESTION: &str = "Remember the stars that you made from the machines? Which machine made these stars?";

pub const EXTRA_SMALL_QUESTION: &str = "Now the elf boss gives you one more slot to make stars. The slot looks like this. Which machine would you like to put this slot in?";

pub const SMALL_EXPERIMENT_QUESTION: &str = "Now there is a new slot on the right end of each machine. The elf boss wants you to make an extra small star for his baby, smaller than any of the other ones you have seen. You have one chance. Which slot will you use?";

pub const QUESTIONS: [&str; 6] = [
    "You are now an elf working in a hat factory. Before you start working, you are given 2 hats to try out. The machines change the size of the hats. You can put them in any of the slots in any of the machines.",
    "Now the elf boss wants you to make the biggest hats you can make. Where would you put these three hats?",
    "Now the elf boss wants you to make three medium sized hats. Where would you put these three hats?",
    "Now the elf boss wants you to make three small hats. Where would you put these three hats?",
    "Now the elf boss has a new job for you. You will work to make new kinds of things that he wants. Which machine do you want to keep?",
    "You are now given more things. You can play with one machine more. Which machine do you choose?",
];

pub const LIGHTBULB_QUESTIONS: [&str; 3] = [
    "You are now an elf working in a lightbulb factory. Before you start working, you are given 2 lightbulbs to try out. The machines change the brightness of the lightbulbs. You can put them in any of the slots in any of the machines.",
    "Now the elf boss wants you to make a dim lightbulb a bright lightbulb (like circled). Where would you put this lightbulb to make it a bright lightbulb?",
    "Now the elf boss wants you to make a bright lightbulb a dim lightbulb (like circled). Where would you put this lightbulb to make it a dim lightbulb?",
];

pub const EXPLORATION_INSTRUCTION: &str =
    "You are now given 2 mushrooms. You can put them in any of the slots from any of the machines.";

/// Item budgets for the four question sub-rounds.
pub const QUESTION_BUDGETS: [u32; 4] = [2, 3, 3, 3];

/// Item budgets for the three lightness rounds.
pub const LIGHTNESS_BUDGETS: [u32; 3] = [2, 1, 1];

pub const MAX_LIGHTBULB_ROUNDS: usize = 3;

/// Index into `QUESTIONS` where the verbal (click-only) questions begin.
pub const VERBAL_QUESTION_START: usize = 4;

/// Tagged sub-states of the extrasmall phase: first a machine-choice
/// question, then a single drop into the newly added fourth slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraSmallStep {
    MachineChoice,
    SlotDrop,
}

/// Instructions from the controller to the session and presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    ResetReactionClock,
    /// Re-render the machines; the layout copy gains the fourth slot.
    Rerender {
        extra_slot: bool,
    },
    /// Remove previously revealed items by handle.
    ClearItems(Vec<u64>),
    /// Reset every outcome container (exploration entry).
    ClearAllOutcomes,
    Narrate(NarrationCue),
    ShowInstruction(String),
    /// Display the recalled outcome grouping at a machine position.
    ShowOutcomeGrouping {
        position: usize,
    },
    /// Show the brightness reference pairs with a highlighted target level.
    ShowBrightnessReference {
        round: usize,
        target: u8,
    },
    /// Budget exhausted (or a choice answered): show the free-text
    /// explanation prompt and the continue affordance.
    RevealExplanationPrompt,
    /// Terminal reached: produce and deliver the export payload.
    Export,
}

/// Result of registering a drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTicket {
    pub trial: TrialTag,
    pub exhausted: bool,
    pub directives: Vec<Directive>,
}

/// Result of registering a machine-click choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceTicket {
    pub question: &'static str,
    /// For recall questions: the machine position whose outcomes are being
    /// asked about. Correctness is attributed against the machine there.
    pub expected_position: Option<usize>,
    pub directives: Vec<Directive>,
}

/// Phase-local mutable state. `current` is written only by transitions.
#[derive(Debug)]
struct PhaseState {
    current: Phase,
    remaining_budget: u32,
    extra_small_step: ExtraSmallStep,
    comprehension_index: usize,
    question_index: usize,
    lightbulb_round: usize,
    extrasmall_trial: u32,
    question_trial: u32,
    lightness_trial: u32,
    exploration_trial: u32,
    items_pending_clear: Vec<u64>,
    awaiting_explanation: bool,
    choice_answered: bool,
}

/// The finite-state machine over experiment phases.
pub struct PhaseController {
    state: PhaseState,
    /// Machine positions that produced at least one outcome during demo;
    /// fixed into `groupings` at comprehension entry.
    demo_observed: [bool; 3],
    groupings: Vec<usize>,
    exploration_budget: u32,
}

impl PhaseController {
    pub fn new(demo_budget: u32, exploration_budget: u32) -> Self {
        Self {
            state: PhaseState {
                current: Phase::Demo,
                remaining_budget: demo_budget,
                extra_small_step: ExtraSmallStep::MachineChoice,
                comprehension_index: 0,
                question_index: 0,
                lightbulb_round: 0,
                extrasmall_trial: 0,
                question_trial: 0,
                lightness_trial: 0,
                exploration_trial: 0,
                items_pending_clear: Vec::new(),
                awaiting_explanation: false,
                choice_answered: false,
            },
            demo_observed: [false; 3],
            groupings: Vec::new(),
            exploration_budget,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.current
    }

    pub fn remaining_budget(&self) -> u32 {
        self.state.remaining_budget
    }

    pub fn awaiting_explanation(&self) -> bool {
        self.state.awaiting_explanation
    }

    pub fn extra_small_step(&self) -> ExtraSmallStep {
        self.state.extra_small_step
    }

    pub fn question_index(&self) -> usize {
        self.state.question_index
    }

    pub fn lightbulb_round(&self) -> usize {
        self.state.lightbulb_round
    }

    /// Whether a drop is currently legal.
    pub fn can_drop(&self) -> bool {
        match self.state.current {
            Phase::Demo => self.state.remaining_budget > 0,
            Phase::ExtraSmall => {
                self.state.extra_small_step == ExtraSmallStep::SlotDrop
                    && self.state.remaining_budget > 0
            }
            Phase::Question | Phase::Lightness | Phase::Exploration => {
                self.state.remaining_budget > 0 && !self.state.awaiting_explanation
            }
            _ => false,
        }
    }

    /// Whether a machine click is currently legal.
    pub fn can_click(&self) -> bool {
        match self.state.current {
            Phase::Comprehension => {
                !self.state.choice_answered
                    && self.state.comprehension_index < self.groupings.len()
            }
            Phase::ExtraSmall => {
                self.state.extra_small_step == ExtraSmallStep::MachineChoice
                    && !self.state.choice_answered
            }
            Phase::VerbalQuestion => {
                !self.state.choice_answered && self.state.question_index < QUESTIONS.len()
            }
            _ => false,
        }
    }

    /// Consume one unit of the phase budget for a resolved drop. `position`
    /// is the machine's display position; `handle` identifies the revealed
    /// item for later clearing.
    pub fn register_drop(&mut self, position: usize, handle: u64) -> Option<DropTicket> {
        if !self.can_drop() {
            warn!(phase = self.state.current.label(), "drop ignored");
            return None;
        }

        self.state.remaining_budget -= 1;

        let trial = match self.state.current {
            Phase::Demo => {
                if let Some(observed) = self.demo_observed.get_mut(position) {
                    *observed = true;
                }
                TrialTag::Empty
            }
            Phase::ExtraSmall => {
                self.state.extrasmall_trial += 1;
                TrialTag::Number(self.state.extrasmall_trial)
            }
            Phase::Question => {
                self.state.question_trial += 1;
                self.state.items_pending_clear.push(handle);
                TrialTag::Number(self.state.question_trial)
            }
            Phase::Lightness => {
                self.state.lightness_trial += 1;
                self.state.items_pending_clear.push(handle);
                TrialTag::Number(self.state.lightness_trial)
            }
            Phase::Exploration => {
                self.state.exploration_trial += 1;
                TrialTag::Number(self.state.exploration_trial)
            }
            _ => TrialTag::Empty,
        };

        let exhausted = self.state.remaining_budget == 0;
        let mut directives = Vec::new();
        if exhausted && self.state.current != Phase::Demo {
            self.state.awaiting_explanation = true;
            directives.push(Directive::RevealExplanationPrompt);
        }

        Some(DropTicket {
            trial,
            exhausted,
            directives,
        })
    }

    /// Register a machine click for the current question.
    pub fn register_choice(&mut self) -> Option<ChoiceTicket> {
        if !self.can_click() {
            warn!(phase = self.state.current.label(), "click ignored");
            return None;
        }

        match self.state.current {
            Phase::Comprehension => {
                let position = self.groupings[self.state.comprehension_index];
                self.state.comprehension_index += 1;
                self.state.choice_answered = true;
                Some(ChoiceTicket {
                    question: COMPREHENSION_QUESTION,
                    expected_position: Some(position),
                    directives: Vec::new(),
                })
            }
            Phase::ExtraSmall => {
                self.state.choice_answered = true;
                self.state.awaiting_explanation = true;
                Some(ChoiceTicket {
                    question: EXTRA_SMALL_QUESTION,
                    expected_position: None,
                    directives: vec![Directive::RevealExplanationPrompt],
                })
            }
            Phase::VerbalQuestion => {
                let question = QUESTIONS[self.state.question_index];
                self.state.question_index += 1;
                self.state.choice_answered = true;
                self.state.awaiting_explanation = true;
                Some(ChoiceTicket {
                    question,
                    expected_position: None,
                    directives: vec![Directive::RevealExplanationPrompt],
                })
            }
            _ => None,
        }
    }

    /// The continue affordance. Evaluates the current phase's transition
    /// condition; an illegal press is a logged no-op that changes nothing.
    pub fn advance(&mut self) -> Vec<Directive> {
        let legal = match self.state.current {
            Phase::Demo => self.state.remaining_budget == 0,
            Phase::Comprehension => self.state.choice_answered,
            Phase::ExtraSmall => match self.state.extra_small_step {
                ExtraSmallStep::MachineChoice => self.state.choice_answered,
                ExtraSmallStep::SlotDrop => self.state.remaining_budget == 0,
            },
            Phase::Question | Phase::Lightness => self.state.remaining_budget == 0,
            Phase::VerbalQuestion => self.state.choice_answered,
            Phase::Exploration => true,
            Phase::Terminal => false,
        };
        if !legal {
            warn!(phase = self.state.current.label(), "continue ignored");
            return Vec::new();
        }

        let was_awaiting = self.state.awaiting_explanation;
        self.state.choice_answered = false;
        self.state.awaiting_explanation = false;

        let mut directives = vec![Directive::ResetReactionClock];
        match self.state.current {
            Phase::Demo => directives.extend(self.enter_comprehension()),
            Phase::Comprehension => {
                if self.state.comprehension_index < self.groupings.len() {
                    directives.push(Directive::Narrate(NarrationCue::new(
                        Phase::Comprehension,
                        CueKind::Prompt,
                    )));
                    directives.push(Directive::ShowOutcomeGrouping {
                        position: self.groupings[self.state.comprehension_index],
                    });
                } else {
                    directives.extend(self.enter_extra_small());
                }
            }
            Phase::ExtraSmall => match self.state.extra_small_step {
                ExtraSmallStep::MachineChoice => {
                    self.state.extra_small_step = ExtraSmallStep::SlotDrop;
                    self.state.remaining_budget = 1;
                    directives.push(Directive::Rerender { extra_slot: true });
                    directives.push(Directive::Narrate(NarrationCue::new(
                        Phase::ExtraSmall,
                        CueKind::FollowUp,
                    )));
                    directives.push(Directive::ShowInstruction(
                        SMALL_EXPERIMENT_QUESTION.to_string(),
                    ));
                }
                ExtraSmallStep::SlotDrop => directives.extend(self.enter_question()),
            },
            Phase::Question => {
                directives.push(Directive::ClearItems(std::mem::take(
                    &mut self.state.items_pending_clear,
                )));
                if self.state.question_index < QUESTION_BUDGETS.len() {
                    directives.extend(self.start_question_round());
                } else {
                    directives.extend(self.enter_lightness());
                }
            }
            Phase::Lightness => {
                directives.push(Directive::ClearItems(std::mem::take(
                    &mut self.state.items_pending_clear,
                )));
                if self.state.lightbulb_round < MAX_LIGHTBULB_ROUNDS {
                    directives.extend(self.start_lightness_round());
                } else {
                    directives.extend(self.enter_verbal());
                }
            }
            Phase::VerbalQuestion => {
                if self.state.question_index < QUESTIONS.len() {
                    directives.push(Directive::Narrate(NarrationCue::new(
                        Phase::VerbalQuestion,
                        CueKind::Round(self.state.question_index),
                    )));
                    directives.push(Directive::ShowInstruction(
                        QUESTIONS[self.state.question_index].to_string(),
                    ));
                } else {
                    directives.extend(self.enter_exploration());
                }
            }
            Phase::Exploration => {
                if was_awaiting {
                    self.state.current = Phase::Terminal;
                    directives.push(Directive::Export);
                } else {
                    // Operator finished free play early.
                    self.state.remaining_budget = 0;
                    self.state.awaiting_explanation = true;
                    directives.push(Directive::RevealExplanationPrompt);
                }
            }
            Phase::Terminal => {}
        }
        directives
    }

    /// Force the session to its terminal phase (operator early exit).
    pub fn terminate(&mut self) {
        self.state.current = Phase::Terminal;
    }

    fn enter_comprehension(&mut self) -> Vec<Directive> {
        self.groupings = (0..3).filter(|&p| self.demo_observed[p]).collect();
        if self.groupings.is_empty() {
            // Nothing to recall; fall straight through to extrasmall.
            return self.enter_extra_small();
        }
        self.state.current = Phase::Comprehension;
        vec![
            Directive::Narrate(NarrationCue::new(Phase::Comprehension, CueKind::Prompt)),
            Directive::ShowInstruction(COMPREHENSION_QUESTION.to_string()),
            Directive::ShowOutcomeGrouping {
                position: self.groupings[0],
            },
        ]
    }

    fn enter_extra_small(&mut self) -> Vec<Directive> {
        self.state.current = Phase::ExtraSmall;
        self.state.extra_small_step = ExtraSmallStep::MachineChoice;
        vec![
            Directive::Narrate(NarrationCue::new(Phase::ExtraSmall, CueKind::Prompt)),
            Directive::ShowInstruction(EXTRA_SMALL_QUESTION.to_string()),
        ]
    }

    fn enter_question(&mut self) -> Vec<Directive> {
        self.state.current = Phase::Question;
        self.state.question_index = 0;
        self.start_question_round()
    }

    fn start_question_round(&mut self) -> Vec<Directive> {
        let index = self.state.question_index;
        self.state.remaining_budget = QUESTION_BUDGETS[index];
        self.state.question_index += 1;
        vec![
            Directive::Narrate(NarrationCue::new(Phase::Question, CueKind::Round(index))),
            Directive::ShowInstruction(QUESTIONS[index].to_string()),
        ]
    }

    fn enter_lightness(&mut self) -> Vec<Directive> {
        self.state.current = Phase::Lightness;
        self.start_lightness_round()
    }

    fn start_lightness_round(&mut self) -> Vec<Directive> {
        let round = self.state.lightbulb_round;
        self.state.remaining_budget = LIGHTNESS_BUDGETS[round];
        self.state.lightbulb_round += 1;

        let mut directives = vec![Directive::Narrate(NarrationCue::new(
            Phase::Lightness,
            CueKind::Round(round),
        ))];
        // Rounds 1 and 2 show the reference pairs with a highlighted target:
        // make-it-bright (level 4) then make-it-dim (level 1).
        match round {
            1 => directives.push(Directive::ShowBrightnessReference { round, target: 4 }),
            2 => directives.push(Directive::ShowBrightnessReference { round, target: 1 }),
            _ => {}
        }
        directives.push(Directive::ShowInstruction(format!(
            "Round {}/{}: {}",
            round + 1,
            MAX_LIGHTBULB_ROUNDS,
            LIGHTBULB_QUESTIONS[round]
        )));
        directives
    }

    fn enter_verbal(&mut self) -> Vec<Directive> {
        self.state.current = Phase::VerbalQuestion;
        vec![
            Directive::Narrate(NarrationCue::new(
                Phase::VerbalQuestion,
                CueKind::Round(self.state.question_index),
            )),
            Directive::ShowInstruction(QUESTIONS[self.state.question_index].to_string()),
        ]
    }

    fn enter_exploration(&mut self) -> Vec<Directive> {
        self.state.current = Phase::Exploration;
        self.state.remaining_budget = self.exploration_budget;
        vec![
            Directive::Narrate(NarrationCue::new(Phase::Exploration, CueKind::Prompt)),
            Directive::ShowInstruction(EXPLORATION_INSTRUCTION.to_string()),
            Directive::ClearAllOutcomes,
        ]
    }
}
