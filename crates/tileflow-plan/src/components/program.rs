//! Programs run by the compute tiles.
//!
//! Each compute tile repeats the same loop forever: acquire an output object, optionally
//! initialize it, then for every round acquire one object of each input, call the body kernel
//! and release the inputs, and finally release the output. The loop is modelled by [CoreLoop],
//! a state machine that yields the acquire, call and release actions of each transition and
//! stops at the next idle point once its stop flag is raised.
//!
//! The planner never runs these loops. It uses them to check that the schedule moves exactly
//! the objects the loops acquire.

use core::sync::atomic::{AtomicBool, Ordering};
use hashbrown::HashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::components::{
    BufferShape, ConfigError, PlanError, SchedulingError,
    channel::{ChannelId, ChannelNetwork, Link},
    schedule::Schedule,
    topology::Tile,
};

/// A function compiled outside of the plan, called on acquired objects.
#[derive(new, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExternalKernel {
    pub name: String,
    /// Object file providing the symbol.
    pub object: String,
    /// Expected shape of every argument.
    pub args: Vec<BufferShape>,
}

#[derive(new, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KernelCall {
    pub kernel: String,
    /// Channels whose currently acquired objects are passed, in argument order.
    pub args: Vec<ChannelId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CoreProgram {
    pub tile: Tile,
    pub output: ChannelId,
    pub inputs: Vec<ChannelId>,
    /// Input acquisitions per output object.
    pub rounds: u32,
    /// Called once the output is acquired.
    pub init: Option<KernelCall>,
    /// Called every round with the acquired inputs.
    pub body: Option<KernelCall>,
}

impl CoreProgram {
    fn calls(&self) -> impl Iterator<Item = &KernelCall> {
        self.init.iter().chain(self.body.iter())
    }

    /// Checks every call against the declared kernel signatures.
    pub fn check_signatures(
        &self,
        kernels: &[ExternalKernel],
        network: &ChannelNetwork,
    ) -> Result<(), PlanError> {
        for call in self.calls() {
            let kernel = kernels
                .iter()
                .find(|kernel| kernel.name == call.kernel)
                .ok_or_else(|| ConfigError::UnknownKernel {
                    kernel: call.kernel.clone(),
                })?;

            let arity = kernel.args.len().max(call.args.len());
            for argument in 0..arity {
                let expected = kernel.args.get(argument);
                let channel = call
                    .args
                    .get(argument)
                    .map(|id| network.channel(*id))
                    .transpose()?;

                if expected != channel.map(|channel| &channel.shape) {
                    return Err(ConfigError::KernelSignature {
                        kernel: kernel.name.clone(),
                        argument,
                        expected: describe(expected),
                        actual: describe(channel.map(|channel| &channel.shape)),
                        channel: channel
                            .map(|channel| channel.name.clone())
                            .unwrap_or_default(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}

fn describe(shape: Option<&BufferShape>) -> String {
    shape
        .map(ToString::to_string)
        .unwrap_or_else(|| "no argument".to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Port {
    Produce,
    Consume,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum CoreAction {
    Acquire { channel: ChannelId, port: Port },
    Call(KernelCall),
    Release { channel: ChannelId, port: Port },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Filling { round: u32 },
    Computing { round: u32 },
    Draining,
}

/// Step-wise execution of a [CoreProgram].
pub struct CoreLoop<'a> {
    program: &'a CoreProgram,
    state: LoopState,
    iterations: u32,
    stop: Arc<AtomicBool>,
}

impl<'a> CoreLoop<'a> {
    pub fn new(program: &'a CoreProgram) -> Self {
        Self {
            program,
            state: LoopState::Idle,
            iterations: 0,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the loop the next time it is idle.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Completed output objects.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Performs one transition. Returns `None` once stopped.
    pub fn step(&mut self) -> Option<Vec<CoreAction>> {
        let program = self.program;
        let last_round = program.rounds.checked_sub(1);

        let (actions, next) = match self.state {
            LoopState::Idle => {
                if self.stop.load(Ordering::Relaxed) {
                    return None;
                }
                let mut actions = vec![CoreAction::Acquire {
                    channel: program.output,
                    port: Port::Produce,
                }];
                actions.extend(program.init.clone().map(CoreAction::Call));
                let next = match last_round {
                    Some(_) => LoopState::Filling { round: 0 },
                    None => LoopState::Draining,
                };
                (actions, next)
            }
            LoopState::Filling { round } => {
                let actions = program
                    .inputs
                    .iter()
                    .map(|channel| CoreAction::Acquire {
                        channel: *channel,
                        port: Port::Consume,
                    })
                    .collect();
                (actions, LoopState::Computing { round })
            }
            LoopState::Computing { round } => {
                let mut actions: Vec<CoreAction> =
                    program.body.clone().map(CoreAction::Call).into_iter().collect();
                actions.extend(program.inputs.iter().map(|channel| CoreAction::Release {
                    channel: *channel,
                    port: Port::Consume,
                }));
                let next = match Some(round) == last_round {
                    true => LoopState::Draining,
                    false => LoopState::Filling { round: round + 1 },
                };
                (actions, next)
            }
            LoopState::Draining => {
                self.iterations += 1;
                let actions = vec![CoreAction::Release {
                    channel: program.output,
                    port: Port::Produce,
                }];
                (actions, LoopState::Idle)
            }
        };

        self.state = next;
        Some(actions)
    }

    /// Runs whole iterations and returns their actions.
    pub fn run(&mut self, iterations: u32) -> Vec<CoreAction> {
        let target = self.iterations + iterations;
        let mut actions = Vec::new();

        while self.iterations < target || self.state != LoopState::Idle {
            match self.step() {
                Some(step) => actions.extend(step),
                None => break,
            }
        }

        actions
    }
}

/// Acquire and release counts of one channel over a loop iteration.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
struct Cadence {
    acquires: usize,
    releases: usize,
}

/// Checks that over `iterations` passes of every compute loop, the schedule delivers exactly the
/// objects the loops acquire and drains exactly the objects they release.
pub fn check_cadence(
    programs: &[CoreProgram],
    iterations: u32,
    network: &ChannelNetwork,
    schedule: &Schedule,
) -> Result<(), SchedulingError> {
    for program in programs {
        let mut cadences: HashMap<ChannelId, Cadence> = HashMap::new();
        for action in CoreLoop::new(program).run(1) {
            match action {
                CoreAction::Acquire { channel, .. } => {
                    cadences.entry(channel).or_default().acquires += 1
                }
                CoreAction::Release { channel, .. } => {
                    cadences.entry(channel).or_default().releases += 1
                }
                CoreAction::Call(_) => {}
            }
        }

        let mut channels: Vec<_> = cadences.into_iter().collect();
        channels.sort_by_key(|(channel, _)| *channel);

        for (id, cadence) in channels {
            let channel = network.channel(id)?;
            if cadence.acquires != cadence.releases {
                return Err(SchedulingError::CadenceMismatch {
                    channel: channel.name.clone(),
                    expected: cadence.acquires,
                    scheduled: cadence.releases,
                });
            }

            let expected = iterations as usize * cadence.acquires;
            let scheduled = match id == program.output {
                true => drained(id, network, schedule)?,
                false => delivered(id, network, schedule)?,
            };

            if expected != scheduled {
                return Err(SchedulingError::CadenceMismatch {
                    channel: channel.name.clone(),
                    expected,
                    scheduled,
                });
            }
        }
    }

    Ok(())
}

fn transferred_objects(
    id: ChannelId,
    network: &ChannelNetwork,
    schedule: &Schedule,
) -> Result<usize, SchedulingError> {
    let channel = network.channel(id)?;
    let elems = channel.num_elems();
    let moved: usize = schedule
        .transfers_on(id)
        .map(|descriptor| descriptor.pattern.num_elems())
        .sum();

    if elems == 0 || moved % elems != 0 {
        return Err(SchedulingError::PartialObjects {
            channel: channel.name.clone(),
            moved,
            object_elems: elems,
        });
    }

    Ok(moved / elems)
}

// Objects reaching `id`, following links back to the host.
fn delivered(
    id: ChannelId,
    network: &ChannelNetwork,
    schedule: &Schedule,
) -> Result<usize, SchedulingError> {
    if network.channel(id)?.producer.is_boundary() {
        return transferred_objects(id, network, schedule);
    }

    match network.link_into(id) {
        Some(link) if link.is_join() => link
            .sources()
            .iter()
            .map(|source| delivered(*source, network, schedule))
            .try_fold(usize::MAX, |min, count| count.map(|count| min.min(count))),
        Some(Link::Broadcast { source, .. }) => delivered(*source, network, schedule),
        Some(Link::Distribute { sources, .. }) => delivered(sources[0], network, schedule),
        None => Ok(0),
    }
}

// Objects leaving `id`, following links forward to the host.
fn drained(
    id: ChannelId,
    network: &ChannelNetwork,
    schedule: &Schedule,
) -> Result<usize, SchedulingError> {
    if network.channel(id)?.is_output() {
        return transferred_objects(id, network, schedule);
    }

    match network.link_from(id) {
        Some(link) => drained(link.dests()[0], network, schedule),
        None => Ok(0),
    }
}
