//! rift-core - the gap-buffered editing core of a terminal source-code editor
//!
//! This crate is the editing engine only: document model, navigation, marks,
//! undo, search & replace, and a buffer-to-screen-cell projector. Input
//! decoding, terminal rendering, config-file parsing, command dispatch,
//! file-explorer/clipboard IPC, prompt UI, and lexer loading all live outside
//! this crate; where they must reach in, they do so through the seams this
//! crate exposes (`TokenProvider`, `RegexEngine`, `PromptResponder`,
//! `Clipboard`).

pub mod config;
pub mod document;
pub mod error;
pub mod gap_buffer;
pub mod marks;
pub mod position;
pub mod search;
pub mod stream;
pub mod undo;
pub mod view;

pub use config::{DocumentConfig, FileFormat};
pub use document::Document;
pub use error::{EditError, EditResult, ErrorKind, ErrorSeverity, Notification};
pub use gap_buffer::GapBuffer;
pub use marks::{MarkFlags, MarkHandle, MarkRegistry};
pub use position::{CharClass, Position, Range};
pub use search::{PromptAnswer, PromptResponder, RegexEngine, ReplaceStep, SearchKind, SearchState};
pub use stream::{BufferInputStream, BufferOutputStream, Clipboard};
pub use undo::{ChangeState, UndoLog};
pub use view::{Cell, CellAttrs, NullTokenProvider, TokenProvider, ViewProjector};
