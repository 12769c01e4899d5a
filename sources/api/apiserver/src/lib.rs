/*!
# Background

This is the configuration API server.  It serves one configuration tree over HTTP, along with
its version history, to administrators who change it and to slaves that replicate it.

# Roles

A server runs as one of two roles, fixed in its config file:

* The **master** owns the data store.  It accepts commits and rollbacks from authorized
  identities, records every version, and keeps a registry of slaves that have announced
  themselves.  With `notify_slaves`, it asks live slaves to poll right after each write.
* A **replica** embeds a syncdog `Syncer` and answers reads from its synced copy.  Other slaves
  can poll it instead of the master.  It refuses writes, and has no history of its own.

Only one master should be configured per configuration domain; nothing coordinates two of them.

# Identity

Authentication happens in front of the server.  Whatever terminates it passes the caller's
identity in the `X-Authenticated-Identity` header, and writes without one are refused.

# Routes

| Operation | Route |
|---|---|
| current version | `GET /version` |
| full snapshot | `GET /data` |
| snapshot if newer | `GET /data/if-newer?version=V` |
| register a slave | `POST /slaves` |
| list slaves | `GET /slaves` |
| commit | `POST /commit` (body: CFG text) |
| write enabled? | `GET /write-enabled` |
| history | `GET /history?limit=N` |
| version contents | `GET /history/contents?versions=V1,V2` |
| rollback | `POST /rollback?version=V` |
| poll now | `POST /refresh` |

Errors come back with an HTTP status reflecting their kind and the error message as the body.
*/

pub mod config;
pub mod server;

pub use server::serve;
