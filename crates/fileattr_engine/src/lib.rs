/* 📖 # What does fileattr_engine do?

It turns the raw metadata records of the PAL into one attribute model and back:

- `normalizer`: raw stat record to [`FileInfo`]
- `resolver`: link detection, target reading and re-stat of the target
- `mutator`: desired attributes to ordered native calls
- `capability`: which attributes each platform can report and set
- `service`: the facade that ties these to a `PalHandle`
*/

pub mod capability;
pub mod config;
pub mod file_info;
pub mod mutator;
pub mod normalizer;
pub mod resolver;
pub mod service;

pub use capability::{Attributes, CapabilitySet, MutationModel, capabilities_for, host_capabilities};
pub use config::{AttributesConfig, Config, load_config};
pub use file_info::FileInfo;
pub use mutator::{AttributeChange, AttributeDelta, NativeOp, compute_delta};
pub use normalizer::{normalize, normalize_result};
pub use resolver::resolve_and_stat;
pub use service::AttributeService;
