use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::{ExtractArgs, OcrMode};
use crate::config::{
    EdgeConfig, FragmentConfig, JoinConfig, MatchingConfig, MetadataConfig, OcrConfig,
    OutputConfig, PatternScope, PipelineConfig, ReassemblyConfig, ScanThresholds, TableConfig,
    TitleConfig,
};
use crate::model::{DocumentKind, DocumentRecord, RecordMetadata};

mod edges;
mod fragments;
mod lattice;
mod matching;
mod metadata;
mod ocr;
mod paragraphs;
mod pipeline;
mod reassemble;
mod run;
mod scan;
mod source;
mod tables;
#[cfg(test)]
mod tests;
mod title;
mod types;
mod word;

pub use run::run;

#[cfg(test)]
use run::{Batch, NO_CONTENT, write_record};

use edges::*;
use fragments::*;
use lattice::*;
use matching::*;
use metadata::*;
use ocr::*;
use paragraphs::*;
use pipeline::*;
use reassemble::*;
use scan::*;
use source::*;
use tables::*;
use title::*;
use types::*;
use word::*;
