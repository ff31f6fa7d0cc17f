// Copyright 2025 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Errors returned by pools, the pool manager and state machines.
///
/// Only caller mistakes end up here. Looking up an object that is not in a pool, or discarding
/// one that is still in use, is logged and reported through a `false` return instead.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The target is already resident in the pool.
    #[error("object is already registered in the pool of `{type_name}`")]
    DuplicateObject {
        /// Name of the pooled type.
        type_name: &'static str,
    },
    /// A pool for this type has already been created.
    #[error("a pool of `{type_name}` already exists")]
    PoolAlreadyExists {
        /// Name of the pooled type.
        type_name: &'static str,
    },
    /// No pool for this type exists.
    #[error("no pool of `{type_name}` exists")]
    PoolNotFound {
        /// Name of the pooled type.
        type_name: &'static str,
    },
    /// A state machine was created without any states.
    #[error("fsm `{name}` has no states")]
    EmptyFsm {
        /// Name of the state machine.
        name: String,
    },
    /// The state machine has been shut down.
    #[error("fsm has been shut down")]
    FsmDestroyed,
    /// The state machine has not been started yet.
    #[error("fsm `{name}` has not been started")]
    FsmNotStarted {
        /// Name of the state machine.
        name: String,
    },
    /// The requested state type was never registered with the state machine.
    #[error("fsm `{name}` has no state `{state}`")]
    StateNotFound {
        /// Name of the state machine.
        name: String,
        /// Name of the requested state type.
        state: &'static str,
    },
}

/// A specialized [`Result`](std::result::Result) for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
