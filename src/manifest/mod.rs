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

//! CDA manifest reading
//!
//! The manifest is a single JSON object on the source store mapping each
//! table name to its export metadata. Its integers are string-encoded
//! and its shape has drifted over exporter versions, so parsing is done
//! with explicit routines over `serde_json::Value` rather than a rigid
//! derive.

pub mod reader;

pub use reader::{Manifest, ManifestEntry, ManifestError};
