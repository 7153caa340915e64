mod actor;
pub mod dto;
mod repos;
pub mod response;
mod router;
mod subjects;

pub use actor::{ACTOR_HEADER, MaybeActor, RequireActor};
pub use router::{AppState, create_router};
