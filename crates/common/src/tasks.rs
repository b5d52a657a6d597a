use moor_var::Objid;
use serde::{Deserialize, Serialize};

/// A scheduler-assigned task identifier (spec.md §3 "Tasks and Frames": "id"). Monotonically
/// increasing; never reused within a server's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of output the kernel posts toward a connection (spec.md §4.8 "notify() emits a line")
/// or a lifecycle signal the connection manager must act on.
#[derive(Debug, Clone)]
pub enum NarrativeEvent {
    /// `notify(player, text)`: one line of output for the connection to write.
    Notify { player: Objid, text: String },
    /// `boot_player(player)`: the connection manager should disconnect this player.
    Disconnect { player: Objid },
    /// `shutdown([message])`: the connection manager should deliver `message` to every connected
    /// player, then close the listener and exit.
    Shutdown { message: String },
}
