// Remote API client and live-update relay.

pub mod api;
pub mod error;
pub mod relay;

pub use api::{
    ApiClient, RemoteAttachment, RemoteChannel, RemoteMeeting, RemoteMember, RemoteMessage,
    RemoteProfile, SendAttachment, SignInResponse,
};
pub use error::{ApiError, RelayError};
pub use relay::{spawn_relay, RelayCommand, RelayNotification};
