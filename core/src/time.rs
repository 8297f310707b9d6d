// Copyright 2024 Kevin Ludwig
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

/// VMS ticks (100ns since 1858-11-17 00:00:00 UTC) of the POSIX epoch.
const VMS_EPOCH_OFFSET: i64 = 35_067_168_003_000_000;

/// Converts a VMS 64-bit timestamp into a POSIX time expressed as seconds
/// since the Unix epoch (fractional seconds preserved, matching the
/// reference implementation's `/ 1e7`).
pub fn vms_to_unix(vms_ticks: u64) -> f64 {
    (vms_ticks as i64 - VMS_EPOCH_OFFSET) as f64 / 1e7
}
