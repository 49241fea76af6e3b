//! Session Lifecycle Machine (§4.E): the data-driven `(State, Event)`
//! transition table and its lookup helpers.

pub mod table;
