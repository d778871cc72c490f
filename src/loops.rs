//! Loop lifecycle
//!
//! Keeps at most one live [`ScheduledEventGroup`] per [`Channel`]. Replacing a
//! channel's group always releases the old one first, no later than the new
//! group's start, so two groups on one channel are never audible together.
//! A replaced group that is still sounding stays tracked as retiring until its
//! release time, so cancelling the channel silences it as well.

use crate::render::{RenderError, RenderInstruction, SoundHandle, SoundRenderer};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::fmt;

/// A rhythmic voice. Each logical input owns a `Voice`; `Background` is
/// reserved for the continuous scheduler-driven loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Voice(u8),
    Background,
}

/// The sound events produced by one trigger, cancelable as a unit.
pub struct ScheduledEventGroup {
    channel: Channel,
    start_ms: f64,
    ends_at_ms: f64,
    released_at_ms: Option<f64>,
    handles: Vec<Box<dyn SoundHandle>>,
}

impl fmt::Debug for ScheduledEventGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEventGroup")
            .field("channel", &self.channel)
            .field("start_ms", &self.start_ms)
            .field("ends_at_ms", &self.ends_at_ms)
            .field("released_at_ms", &self.released_at_ms)
            .field("events", &self.handles.len())
            .finish()
    }
}

impl ScheduledEventGroup {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn start_ms(&self) -> f64 {
        self.start_ms
    }

    /// When every event in the group has decayed on its own.
    pub fn ends_at_ms(&self) -> f64 {
        self.ends_at_ms
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// When the group falls silent, by release or by decay.
    pub fn silent_at_ms(&self) -> f64 {
        match self.released_at_ms {
            Some(released) => released.min(self.ends_at_ms),
            None => self.ends_at_ms,
        }
    }

    fn release(&mut self, at_ms: Option<f64>) {
        if let Some(at) = at_ms {
            self.released_at_ms = Some(self.released_at_ms.map_or(at, |r| r.min(at)));
        }
        for handle in &mut self.handles {
            let result = match at_ms {
                Some(at) => handle.stop_at(at),
                None => handle.stop(),
            };
            swallow_stop_error(self.channel, result);
        }
    }
}

fn swallow_stop_error(channel: Channel, result: Result<(), RenderError>) {
    if let Err(e) = result {
        debug!("Ignoring failed stop on {:?}: {}", channel, e);
    }
}

pub struct LoopManager {
    renderer: Box<dyn SoundRenderer>,
    groups: HashMap<Channel, ScheduledEventGroup>,
    retiring: Vec<ScheduledEventGroup>,
}

impl LoopManager {
    pub fn new(renderer: Box<dyn SoundRenderer>) -> Self {
        LoopManager {
            renderer,
            groups: HashMap::new(),
            retiring: Vec::new(),
        }
    }

    /// Replaces `channel`'s group with `instruction` starting at `start_ms`.
    ///
    /// The previous group's events are released at `start_ms` before any new
    /// event is rendered. Returns the number of events rendered.
    pub fn trigger(
        &mut self,
        channel: Channel,
        instruction: &RenderInstruction,
        start_ms: f64,
    ) -> usize {
        if let Some(mut previous) = self.groups.remove(&channel) {
            trace!(
                "Replacing {:?} group started at {:.1} ms",
                channel,
                previous.start_ms
            );
            previous.release(Some(start_ms));
            self.retiring.push(previous);
        }

        let mut handles = Vec::with_capacity(instruction.events.len());
        for event in &instruction.events {
            match self.renderer.render_event(event, start_ms) {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("Failed to render {:?} on {:?}: {}", event.kind, channel, e),
            }
        }

        let rendered = handles.len();
        if rendered == 0 {
            debug!("Nothing rendered for {:?} at {:.1} ms", channel, start_ms);
            return 0;
        }

        trace!(
            "Installed {:?} group: {} events at {:.1} ms",
            channel,
            rendered,
            start_ms
        );
        self.groups.insert(
            channel,
            ScheduledEventGroup {
                channel,
                start_ms,
                ends_at_ms: start_ms + instruction.length_ms(),
                released_at_ms: None,
                handles,
            },
        );
        rendered
    }

    /// Stops `channel`'s group now, along with any replaced group on it
    /// that is still waiting for its release.
    pub fn cancel(&mut self, channel: Channel) -> bool {
        let mut stopped = false;
        self.retiring.retain_mut(|group| {
            if group.channel != channel {
                return true;
            }
            group.release(None);
            stopped = true;
            false
        });

        if let Some(mut group) = self.groups.remove(&channel) {
            debug!("Cancelling {:?} group", channel);
            group.release(None);
            stopped = true;
        }
        stopped
    }

    pub fn cancel_all(&mut self) -> usize {
        self.cancel_where(|_| true)
    }

    /// Cancels every channel but `keep`, e.g. to leave gameplay while the
    /// background loop carries on.
    pub fn cancel_all_except(&mut self, keep: Channel) -> usize {
        self.cancel_where(|channel| channel != keep)
    }

    fn cancel_where(&mut self, mut predicate: impl FnMut(Channel) -> bool) -> usize {
        let mut doomed: Vec<Channel> = self
            .groups
            .keys()
            .copied()
            .chain(self.retiring.iter().map(|group| group.channel))
            .filter(|&channel| predicate(channel))
            .collect();
        doomed.sort();
        doomed.dedup();
        for channel in &doomed {
            self.cancel(*channel);
        }
        doomed.len()
    }

    /// Forgets groups that have decayed by `now_ms`, and replaced groups
    /// already past their release.
    pub fn prune_finished(&mut self, now_ms: f64) -> usize {
        self.retiring.retain(|group| group.silent_at_ms() > now_ms);

        let before = self.groups.len();
        self.groups.retain(|channel, group| {
            let live = group.ends_at_ms > now_ms;
            if !live {
                trace!("{:?} group finished at {:.1} ms", channel, group.ends_at_ms);
            }
            live
        });
        before - self.groups.len()
    }

    pub fn is_active(&self, channel: Channel) -> bool {
        self.groups.contains_key(&channel)
    }

    pub fn group(&self, channel: Channel) -> Option<&ScheduledEventGroup> {
        self.groups.get(&channel)
    }

    pub fn active_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.groups.keys().copied().collect();
        channels.sort();
        channels
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Replaced groups that may still be sounding.
    pub fn retiring(&self) -> usize {
        self.retiring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
