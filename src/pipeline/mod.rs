// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.
//
// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

//! Pipeline orchestration
//!
//! Fans the per-entity pipelines (plan, then append, then checkpoint)
//! out over a bounded tokio worker pool. One entity failing never
//! aborts its peers; every entity ends in a [`TableResult`] that
//! carries its errors and warnings.

pub mod processor;
pub mod progress;
pub mod result;

pub use processor::{Processor, ProcessorBuilder};
pub use progress::{NoopProgress, ProgressReporter, TracingProgress};
pub use result::TableResult;
