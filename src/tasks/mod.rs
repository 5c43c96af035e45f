pub mod button;
pub mod feedback;

pub use button::{
    ButtonController, ButtonEvent, EventBus, EventPublisher, EventSink, EventSubscriber,
    InitError, initialize,
};
pub use feedback::feedback_task;
