// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The shared vocabulary subtasks (fetcher, time wheel) use to report their
//! state to a parent, without holding a reference back up to it. A subtask
//! owns an `mpsc::Sender<SubTaskEvent>`; the parent owns the one receiver.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    Ready,
    Running,
    Paused,
    Finished,
    Stopped,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubTaskKind {
    Fetcher,
    TimeWheel,
}

#[derive(Clone, Copy, Debug)]
pub struct SubTaskEvent {
    pub from: SubTaskKind,
    pub status: TaskStatus,
}
