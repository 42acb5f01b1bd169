//! # zulip-stack - deployment template for a self-hosted zulip
//!
//! For usage of the CLI run `zulip-stack --help`.
//!
//! ## Introduction for developers
//!
//! Read this to understand how the template is put together.
//!
//! ### Terms
//!
//! - a `template` is the document handed to the provisioning engine
//! - it contains `resources` (nodes), each with a unique `logical id`
//! - nodes read values of other nodes through intrinsics (`Ref`, `Fn::GetAtt`, `Fn::Sub`), which
//!   makes them implicit dependency edges
//! - `DependsOn` adds explicit dependency edges where no value is read
//! - `parameters` are supplied at deploy time, `conditions` are booleans over parameters that
//!   decide whether a guarded node exists
//!
//! ### Building
//!
//! see [stack::build]
//!
//! Constructs ([constructs]) declare related nodes together into a [stack::Stack]. While doing so
//! they declare the parameters they consume and how those are presented in the console
//! ([metadata]). Parameters are resolved right away ([parameters]), so a malformed value aborts
//! the build before anything is emitted.
//!
//! Every node is checked when it is registered with the [template::Template]:
//!
//! - its logical id is new
//! - everything it references is already declared
//! - its condition exists and holds for this build
//!
//! ### Conditional subgraphs
//!
//! Feature toggles (incoming email, subdomains) are evaluated once at the start of the build. A
//! disabled subgraph is never declared. An enabled one is declared with its `Condition` attached.
//!
//! Any reference to a guarded node must be guarded by the same condition. That is the case when
//!
//! - the referencing node carries the condition, or a condition that is an `Fn::And` over it
//! - the reference sits in the true branch of an `Fn::If` on that condition
//!
//! ```text
//! TargetGroupARNs:
//!   Fn::If:
//!   - EnableIncomingEmailCondition
//!   - [SmtpTargetGroup, HttpsTargetGroup]   <- guarded
//!   - [HttpsTargetGroup]
//! ```
//!
//! ### Finishing
//!
//! [template::Template::finish] reports everything that went wrong at once: unresolved deferred
//! properties, references escaping their guard and all issues collected while registering nodes.
//!
//! ### Output
//!
//! The finished template is serialized via [serde]. Sections and nodes keep their declaration
//! order so building twice from the same input yields identical documents.
//!
pub mod constructs;
pub mod mapping;
pub mod metadata;
pub mod parameters;
pub mod readiness;
pub mod stack;
pub mod template;
pub mod value;
pub mod version;
mod visit;
