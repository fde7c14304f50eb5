/*!
# Port Container Inventory

A web backend for tracking how many shipping containers each agent holds at
each port city, fed by the inventory spreadsheet the yard office maintains.

## Overview

Operators upload the weekly `.xls`/`.xlsx` inventory sheet; the importer walks
it row by row and merges every agent's counts into the per-city record. The
same data can be read, edited and deleted through a small JSON API, and
exported back into the sheet layout.

## Architecture

### Import Pipeline
- **Loader** - Reads the first worksheet of a workbook into tagged cells
- **Importer** - Classifies rows (city, header, agent, skip) and folds them
  into the store with the current city as loop state

### Storage Layer
- In-memory document store keyed by normalized city name
- File snapshot with Gzip compression and bincode serialization, rewritten
  after every mutation

### Web Layer (feature `web`)
- **Technologies**: Rust, axum, tokio
- JWT session tokens (HS256) via `Authorization: Bearer` or the `token` cookie
- Argon2 password hashes for administrator accounts

## Container Types

`20GP`, `40HC`, `20RF`, `40RF`, `20OT`, `40OT`, `20FR`, `40FR`, `20TK`, `45HC`.
An agent's `total` is always the sum of those ten counts.

## Modules

- **port**: Container types, agent and port records
- **cell**: Spreadsheet cell values and numeric coercion
- **loader**: Workbook reading with calamine
- **importer**: Row classification and the import fold
- **store**: Port record store (memory and file-backed)
- **saving**: Snapshot persistence with compression
- **downloader**: Export functionality (CSV, XLSX)
- **config**: Environment configuration
- **login**: Users, session tokens and auth handlers
- **app**: Routing and port handlers

## REST API Endpoints

- `GET /api/ports[?city=X]` - All port records, or one city
- `POST /api/ports` - Replace a city's agent list
- `PUT /api/ports` - Patch one agent
- `DELETE /api/ports?city=X[&agent=Y]` - Remove an agent or a city
- `POST /api/ports/upload` - Import a workbook
- `GET /api/ports/export?format=xlsx|csv` - Download the inventory
- `/api/auth/{login,logout,verify}`, `/api/users`, `/api/admin/system`
*/

pub mod cell;
pub mod config;
pub mod downloader;
pub mod importer;
pub mod loader;
pub mod port;
pub mod saving;
pub mod store;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod error;
#[cfg(feature = "web")]
pub mod login;

pub use cell::CellValue;
pub use importer::{ImportSummary, import_rows};
pub use port::{AgentRecord, ContainerCounts, ContainerType, PortRecord};
pub use store::{FileStore, MemoryStore, PortStore, StoreError};
