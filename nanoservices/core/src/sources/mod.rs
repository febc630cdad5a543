pub mod content_repo;
pub mod entities;
pub mod http_client;
pub mod rapidpro;
pub mod traits;

pub use entities::{check_contact_fields, ContactsSource, FlowsSource, GroupsSource, PageViewsSource};
pub use traits::{Source, TableBatch};
