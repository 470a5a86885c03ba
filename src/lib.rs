/*!
# Police Station Dashboard

A role-gated web dashboard over a spreadsheet of station incidents, built in Rust.

## Overview

Every incident lives as one row of a single spreadsheet file (`.xlsx` or
`.csv`). The whole file is read into memory on first use and rewritten in
full after every change. Users log in with one of three roles, and the role
decides what they may see and change.

## Architecture

### Store
- Loads the dataset wholesale, matching columns by header name
- Group-by aggregations (count per value, sum per group) in first-seen order
- Append and field update, applied all-or-nothing to a copy before the copy
  replaces the file
- Single-writer lock and a write generation counter

### Permission Gate
- Argon2-hashed credential table, built-in or loaded from a users file
- Static role table:

| role         | read aggregates | append | update reported | view by KGID |
|--------------|-----------------|--------|-----------------|--------------|
| admin        | yes             | no     | no              | no           |
| commissioner | yes             | yes    | no              | no           |
| constable    | no              | no     | yes             | yes          |

### Interaction Handlers
- Commissioner: validate the incident form, append, persist, reload
- Constable: find by KGID and case number, stamp `Reported`, persist, reload;
  per-KGID read-only view

## Modules

- **record**: Incident row, column names and typed values
- **dataset**: In-memory table, lookups, aggregation and headline metrics
- **loader**: Reading `.xlsx` and `.csv` files
- **saving**: Atomic full-file rewrite
- **store**: Cached, file-backed dataset shared between requests
- **login**: Roles, permissions, credentials and sessions
- **workflows**: Commissioner and constable workflows
- **config**: Command-line and environment configuration
- **app**: HTTP routing (requires the `web` feature)

## REST API Endpoints

- `POST /login`, `POST /logout` - Session management
- `GET /api/session` - Current role
- `GET /api/dashboard` - Headline metrics and distributions
- `GET /api/records`, `POST /api/records` - Data preview and commissioner entry
- `GET /api/constable/records?kgid=` - Rows for one officer
- `POST /api/constable/report` - Multipart evidence submission
*/

pub mod app;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod login;
pub mod record;
pub mod saving;
pub mod store;
pub mod workflows;

/// Re-export the types most callers need
pub use dataset::{DashboardSummary, Dataset};
pub use error::{DashboardError, FieldError, Result};
pub use login::{CredentialStore, Operation, Role, Session, authorize};
pub use record::{Column, FieldValue, IncidentRecord};
pub use store::Store;
