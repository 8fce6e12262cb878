//! Pipeline glue for both halves of the system: the publisher-side harvest
//! (select run, discover pods, stream logs, publish) and the consumer-side
//! notify loop (pull, thread into Slack, acknowledge).

mod harvest;
mod notify;

pub use harvest::{run_harvest, HarvestConfig, HarvestReport, PodFailure};
pub use notify::{run_notify_loop, run_notify_once, NotifyLoopConfig, NotifyReport};

#[cfg(test)]
mod tests;
