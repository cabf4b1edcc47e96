//! Side effects handed back to an Elm-style view layer.
//!
//! Views that follow a message/update loop receive mutation results and
//! invalidation effects as [`Command`]s instead of awaiting them directly.

use futures::{
    FutureExt, Stream, StreamExt,
    stream::{self, BoxStream, select_all},
};

/// A command that can be executed to perform side effects.
///
/// A command is a stream of messages produced by asynchronous work, such as
/// a mutation finishing or a cache invalidation running. The view layer
/// drives the stream and feeds each message to its update function.
///
/// # Examples
///
/// ```
/// use campus_board::command::Command;
///
/// enum Message {
///     GotResult(i32),
/// }
///
/// let cmd = Command::perform(async { 42 }, Message::GotResult);
/// ```
pub struct Command<Msg: Send + 'static> {
    stream: Option<BoxStream<'static, Msg>>,
}

impl<Msg: Send + 'static> Command<Msg> {
    /// Create a command that does nothing.
    pub fn none() -> Self {
        Self { stream: None }
    }

    /// Returns `true` if the command has no work attached.
    pub const fn is_none(&self) -> bool {
        self.stream.is_none()
    }

    /// Perform an asynchronous operation and convert its result to a message.
    ///
    /// # Examples
    ///
    /// ```
    /// use campus_board::command::Command;
    ///
    /// async fn fetch_data() -> String {
    ///     "data".to_string()
    /// }
    ///
    /// enum Message {
    ///     DataReceived(String),
    /// }
    ///
    /// let cmd = Command::perform(fetch_data(), Message::DataReceived);
    /// ```
    pub fn perform<A>(
        future: impl Future<Output = A> + Send + 'static,
        f: impl FnOnce(A) -> Msg + Send + 'static,
    ) -> Self {
        Self::future(future.map(f))
    }

    /// Create a command from a future that produces a message.
    pub fn future(future: impl Future<Output = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(future.into_stream().boxed()),
        }
    }

    /// Create a command that runs `future` for its effect and produces no message.
    pub fn effect(future: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            stream: Some(
                future
                    .into_stream()
                    .filter_map(|()| async { None })
                    .boxed(),
            ),
        }
    }

    /// Batch multiple commands into a single command.
    ///
    /// All commands run concurrently; message order is not guaranteed.
    /// `Command::none()` entries are filtered out.
    pub fn batch(commands: impl IntoIterator<Item = Command<Msg>>) -> Self {
        let streams: Vec<_> = commands.into_iter().filter_map(|cmd| cmd.stream).collect();

        if streams.is_empty() {
            Self::none()
        } else {
            Self {
                stream: Some(select_all(streams).boxed()),
            }
        }
    }

    /// Create a command from a stream of messages.
    pub fn stream(stream: impl Stream<Item = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(stream.boxed()),
        }
    }

    /// Convert every message this command produces.
    ///
    /// # Examples
    ///
    /// ```
    /// use campus_board::command::Command;
    ///
    /// enum Message {
    ///     Saved(Result<u32, String>),
    /// }
    ///
    /// let cmd = Command::future(async { Ok::<u32, String>(1) }).map(Message::Saved);
    /// ```
    pub fn map<U: Send + 'static>(self, f: impl Fn(Msg) -> U + Send + 'static) -> Command<U> {
        Command {
            stream: self.stream.map(|stream| stream.map(f).boxed()),
        }
    }

    /// Turns the command into its message stream; `none` yields an empty stream.
    pub fn into_stream(self) -> BoxStream<'static, Msg> {
        self.stream.unwrap_or_else(|| stream::empty().boxed())
    }
}
