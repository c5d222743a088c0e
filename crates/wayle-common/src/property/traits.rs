use tokio::sync::mpsc;

/// Trait for subscribing to changes in a reactive structure.
///
/// Enables automatic persistence by watching all fields for changes.
pub trait SubscribeChanges {
    /// Subscribe to changes by sending notifications to the provided channel.
    ///
    /// Spawns background tasks that watch for changes and send () to the channel.
    fn subscribe_changes(&self, tx: mpsc::UnboundedSender<()>);
}
