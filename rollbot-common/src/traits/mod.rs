pub mod command_traits;
pub mod repository_traits;

pub use command_traits::{CommandHandler, StaticReply};
pub use repository_traits::ScopeStateRepository;
