//! Native bindings for the `lunabind` scripting runtime.
//!
//! `lunabind` exposes Rust types and functions to scripts running on
//! [`lunabind_core`], and hands script values back to Rust:
//!
//! - **Value codec** ([`FromStack`], [`IntoStack`]): typed reads and writes
//!   of stack slots, including optional values, object handles and tables.
//! - **Call dispatch** ([`IntoFunction`], [`IntoMethod`],
//!   [`IntoConstructor`]): any `Fn` of up to eight parameters becomes a
//!   runtime function; the signature is deduced from the function path.
//! - **Classes** ([`ClassBuilder`]): constructors, methods, attributes and
//!   static functions with single inheritance, possibly across modules.
//! - **Callbacks** ([`Callback`]): script functions kept alive in the
//!   registry and invoked from native code.
//! - **Tables** ([`Table`]): dotted-path access to script tables.
//!
//! # Example
//!
//! ```
//! use lunabind::{register_module, Table, UserData};
//! use lunabind_core::{State, Value};
//!
//! struct Player {
//!     name: String,
//!     score: i32,
//! }
//! impl UserData for Player {}
//!
//! impl Player {
//!     fn new(name: String) -> Self {
//!         Player { name, score: 0 }
//!     }
//!     fn name(&self) -> String {
//!         self.name.clone()
//!     }
//! }
//!
//! let state = State::new();
//! register_module(&state, "Game", |module| {
//!     module
//!         .class::<Player>("Player")
//!         .constructor(Player::new)
//!         .method("name", Player::name)
//!         .attribute("score", |p: &Player| &p.score, |p: &mut Player| &mut p.score)
//!         .register()
//! });
//!
//! let game = state.require("Game").unwrap();
//! let class = state.index_value(&game, Value::from("Player")).unwrap();
//! let player = state.call_function(class, [Value::from("ada")], 1).unwrap().remove(0);
//!
//! state.assign_value(&player, Value::from("score"), Value::Integer(12)).unwrap();
//! let score = state.index_value(&player, Value::from("score")).unwrap();
//! assert_eq!(score, Value::Integer(12));
//!
//! let scores = Table::new(&state);
//! scores.set("ada.best", 12).unwrap();
//! assert_eq!(scores.get::<i32>("ada.best").unwrap(), 12);
//! ```

mod callback;
mod class;
mod codec;
mod config;
mod dispatch;
mod error;
mod identity;
mod lookup;
mod module;
mod object;
mod table;
mod tracker;
mod userdata;

pub use callback::Callback;
pub use class::{CLASS_TABLE, ClassBuilder, ClassDirectory, MemberTable, StaticTable};
pub use codec::{FromStack, FromStackMulti, IntoStack, IntoStackMulti, Nil};
pub use config::{BindConfig, MissingMemberPolicy};
pub use dispatch::{Exclusive, IntoConstructor, IntoFunction, IntoMethod, Shared};
pub use error::{BindError, BindResult};
pub use identity::{ClassPath, TypeHash, class_key};
pub use lookup::{index_hook, newindex_hook};
pub use module::{ModuleBuilder, register_module};
pub use object::{Ptr, Ref, Val, push_object};
pub use table::{Table, TableKey, TableOrigin};
pub use tracker::RefTracker;
pub use userdata::{AsAny, UserData};

pub use lunabind_core;
