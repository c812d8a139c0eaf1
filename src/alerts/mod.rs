mod coordinator;
mod dispatch;
mod resolver;
mod state;
mod store;
mod types;
#[cfg(test)]
mod tests;

pub use coordinator::{AlertCoordinator, AlertRequest};
pub use dispatch::{DeliveryResult, Dispatcher, LogTransport, Notification, NotificationTransport};
pub use resolver::{resolve, AuxFlags};
pub use state::{
    AlertBook, AlertState, AlertStatistics, AlertStatus, AlertTypeStatistics, SuppressionReason,
};
pub use store::{
    AlertId, AlertLogLine, AlertRecord, AlertStore, JsonLinesAlertStore, MemoryAlertStore,
    MEMORY_STORE_CAPACITY,
};
pub use types::AlertType;
