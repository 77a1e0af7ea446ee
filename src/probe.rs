//! Layout probing: asking the platform C toolchain for struct geometry.
//!
//! Requests are batched: the space accumulates every aggregate that needs a
//! layout, and one probe program answers all of them in a single
//! compile-and-run. The `LayoutOracle` trait is the seam that lets tests
//! substitute an arithmetic oracle for the real compiler.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use log::debug;
use thin_vec::ThinVec;
use thiserror::Error;

use crate::native::{NativeType, TypeId};
use crate::structs::StructLayout;

/// An error raised while probing struct layouts.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no C compiler found on PATH")]
    CompilerNotFound,
    #[error("probe i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("probe program failed to compile:\n{0}")]
    CompileFailed(String),
    #[error("probe program failed to run: {0}")]
    ExecFailed(String),
    #[error("malformed probe output: {0}")]
    MalformedOutput(String),
    #[error("cannot compute a natural layout for {0}")]
    Unlayoutable(String),
}

/// One aggregate to lay out: the C spelling to probe and the field list the
/// offsets are reported against.
#[derive(Debug, Clone)]
pub struct LayoutRequest {
    /// The C spelling denoting the aggregate (`struct foo` or a typedef name).
    pub type_name: String,
    pub is_union: bool,
    pub fields: Vec<(String, TypeId)>,
}

/// The C context a probe program compiles against: every header and source
/// chunk the space has seen, plus platform defines.
#[derive(Debug, Clone, Default)]
pub struct ProbeUnit {
    pub headers: Vec<String>,
    pub sources: Vec<String>,
    pub defines: Vec<(String, String)>,
}

/// Resolves a batch of layout requests in one shot.
///
/// Implementations must return exactly one layout per request, in order.
pub trait LayoutOracle {
    fn resolve(
        &self,
        unit: &ProbeUnit,
        requests: &[LayoutRequest],
    ) -> Result<Vec<StructLayout>, ProbeError>;
}

/// Walk PATH for a usable C compiler.
pub fn find_compiler() -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        for name in ["cc", "gcc", "clang"] {
            let candidate = dir.join(format!("{}{}", name, env::consts::EXE_SUFFIX));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// The real oracle: emits a probe program printing `sizeof`, `_Alignof` and
/// `offsetof` for every request, compiles it with the platform compiler, and
/// parses the output.
#[derive(Debug, Default)]
pub struct CcOracle {
    /// Explicit compiler path; when unset, PATH is searched per batch.
    pub compiler: Option<PathBuf>,
}

impl CcOracle {
    fn emit_program(unit: &ProbeUnit, requests: &[LayoutRequest]) -> String {
        let mut src = String::new();
        src.push_str("#include <stddef.h>\n");
        src.push_str("#include <stdio.h>\n");
        for header in &unit.headers {
            let _ = writeln!(src, "#include <{}>", header);
        }
        for chunk in &unit.sources {
            src.push_str(chunk);
            src.push('\n');
        }
        src.push_str("int main(void) {\n");
        for request in requests {
            let _ = writeln!(
                src,
                "    printf(\"%llu %llu\", (unsigned long long) sizeof({0}), \
                 (unsigned long long) _Alignof({0}));",
                request.type_name
            );
            for (field, _) in &request.fields {
                let _ = writeln!(
                    src,
                    "    printf(\" %llu\", (unsigned long long) offsetof({}, {}));",
                    request.type_name, field
                );
            }
            src.push_str("    printf(\"\\n\");\n");
        }
        src.push_str("    return 0;\n}\n");
        src
    }

    fn parse_output(
        stdout: &str,
        requests: &[LayoutRequest],
    ) -> Result<Vec<StructLayout>, ProbeError> {
        let mut layouts = Vec::with_capacity(requests.len());
        let mut lines = stdout.lines();
        for request in requests {
            let line = lines
                .next()
                .ok_or_else(|| ProbeError::MalformedOutput("missing line".to_owned()))?;
            let mut values = Vec::with_capacity(2 + request.fields.len());
            for word in line.split_whitespace() {
                let v: u64 = word.parse().map_err(|_| {
                    ProbeError::MalformedOutput(format!("bad number `{}`", word))
                })?;
                values.push(v);
            }
            if values.len() != 2 + request.fields.len() {
                return Err(ProbeError::MalformedOutput(format!(
                    "expected {} values for `{}`, got {}",
                    2 + request.fields.len(),
                    request.type_name,
                    values.len()
                )));
            }
            layouts.push(StructLayout {
                size: values[0],
                align: values[1],
                offsets: values[2..].iter().copied().collect(),
            });
        }
        Ok(layouts)
    }
}

impl LayoutOracle for CcOracle {
    fn resolve(
        &self,
        unit: &ProbeUnit,
        requests: &[LayoutRequest],
    ) -> Result<Vec<StructLayout>, ProbeError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let compiler = match &self.compiler {
            Some(path) => path.clone(),
            None => find_compiler().ok_or(ProbeError::CompilerNotFound)?,
        };
        debug!(
            "probing {} layouts with {}",
            requests.len(),
            compiler.display()
        );

        let dir = tempfile::tempdir()?;
        let src_path = dir.path().join("layout_probe.c");
        let exe_path = dir.path().join(format!("layout_probe{}", env::consts::EXE_SUFFIX));
        fs::write(&src_path, Self::emit_program(unit, requests))?;

        let mut cmd = Command::new(&compiler);
        cmd.arg(&src_path).arg("-o").arg(&exe_path);
        for (name, value) in &unit.defines {
            cmd.arg(format!("-D{}={}", name, value));
        }
        let compiled = cmd.output()?;
        if !compiled.status.success() {
            return Err(ProbeError::CompileFailed(
                String::from_utf8_lossy(&compiled.stderr).into_owned(),
            ));
        }

        let ran = Command::new(&exe_path).output()?;
        if !ran.status.success() {
            return Err(ProbeError::ExecFailed(format!(
                "exit status {}",
                ran.status
            )));
        }
        Self::parse_output(&String::from_utf8_lossy(&ran.stdout), requests)
    }
}

/// An arithmetic oracle computing natural-alignment layouts from the
/// descriptors themselves, with no toolchain involved.
///
/// It matches real compilers for plainly-padded structs on mainstream ABIs,
/// which is all the test suite needs.
#[derive(Debug, Default)]
pub struct NaturalLayoutOracle;

impl NaturalLayoutOracle {
    fn size_and_align(ty: TypeId) -> Result<(u64, u64), ProbeError> {
        let ptr = std::mem::size_of::<*const u8>() as u64;
        match ty.kind() {
            NativeType::Int { bits, signed: _ } | NativeType::WChar { bits, signed: _ } => {
                let bytes = u64::from(bits) / 8;
                Ok((bytes, bytes))
            }
            NativeType::Float { bytes } => Ok((u64::from(bytes), u64::from(bytes))),
            NativeType::VoidPtr
            | NativeType::Ptr(_)
            | NativeType::ArrayPtr { .. }
            | NativeType::Func { .. } => Ok((ptr, ptr)),
            NativeType::FixedArray { elem, len } => {
                let (size, align) = Self::size_and_align(elem)?;
                Ok((size * len as u64, align))
            }
            NativeType::Struct(id) => {
                let cell = id.cell();
                if let Some(layout) = cell.layout {
                    return Ok((layout.size, layout.align));
                }
                let layout = Self::record_layout(cell.is_union, &cell.fields)?;
                Ok((layout.size, layout.align))
            }
            other @ (NativeType::Void | NativeType::FileStream) => {
                Err(ProbeError::Unlayoutable(format!("{:?}", other)))
            }
        }
    }

    fn record_layout(
        is_union: bool,
        fields: &[(crate::StringId, TypeId)],
    ) -> Result<StructLayout, ProbeError> {
        let mut offsets = ThinVec::with_capacity(fields.len());
        let mut size = 0u64;
        let mut align = 1u64;
        for (_, field_ty) in fields {
            let (fsize, falign) = Self::size_and_align(*field_ty)?;
            align = align.max(falign);
            if is_union {
                offsets.push(0);
                size = size.max(fsize);
            } else {
                let offset = round_up(size, falign);
                offsets.push(offset);
                size = offset + fsize;
            }
        }
        Ok(StructLayout {
            size: round_up(size.max(1), align),
            align,
            offsets,
        })
    }
}

impl LayoutOracle for NaturalLayoutOracle {
    fn resolve(
        &self,
        _unit: &ProbeUnit,
        requests: &[LayoutRequest],
    ) -> Result<Vec<StructLayout>, ProbeError> {
        requests
            .iter()
            .map(|request| {
                let fields: Vec<_> = request
                    .fields
                    .iter()
                    .map(|(name, ty)| (crate::StringId::new(name.as_str()), *ty))
                    .collect();
                Self::record_layout(request.is_union, &fields)
            })
            .collect()
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeType;

    #[test]
    fn natural_layout_pads_between_fields() {
        let c = TypeId::intern(&NativeType::Int {
            bits: 8,
            signed: true,
        });
        let i = TypeId::intern(&NativeType::Int {
            bits: 32,
            signed: true,
        });
        let layout = NaturalLayoutOracle::record_layout(
            false,
            &[
                (crate::StringId::new("c"), c),
                (crate::StringId::new("x"), i),
            ],
        )
        .unwrap();
        assert_eq!(layout.offsets.as_slice(), &[0, 4]);
        assert_eq!(layout.size, 8);
        assert_eq!(layout.align, 4);
    }

    #[test]
    fn natural_layout_unions_overlap() {
        let i = TypeId::intern(&NativeType::Int {
            bits: 32,
            signed: true,
        });
        let d = TypeId::intern(&NativeType::Float { bytes: 8 });
        let layout = NaturalLayoutOracle::record_layout(
            true,
            &[
                (crate::StringId::new("i"), i),
                (crate::StringId::new("d"), d),
            ],
        )
        .unwrap();
        assert_eq!(layout.offsets.as_slice(), &[0, 0]);
        assert_eq!(layout.size, 8);
        assert_eq!(layout.align, 8);
    }

    #[test]
    fn probe_program_shape() {
        let unit = ProbeUnit {
            headers: vec!["sys/types.h".to_owned()],
            sources: vec!["struct point { int x; int y; };".to_owned()],
            defines: Vec::new(),
        };
        let requests = [LayoutRequest {
            type_name: "struct point".to_owned(),
            is_union: false,
            fields: vec![
                ("x".to_owned(), TypeId::intern(&NativeType::Void)),
                ("y".to_owned(), TypeId::intern(&NativeType::Void)),
            ],
        }];
        let src = CcOracle::emit_program(&unit, &requests);
        assert!(src.contains("#include <sys/types.h>"));
        assert!(src.contains("sizeof(struct point)"));
        assert!(src.contains("offsetof(struct point, y)"));
    }

    #[test]
    fn parses_probe_output() {
        let requests = [LayoutRequest {
            type_name: "struct point".to_owned(),
            is_union: false,
            fields: vec![
                ("x".to_owned(), TypeId::intern(&NativeType::Void)),
                ("y".to_owned(), TypeId::intern(&NativeType::Void)),
            ],
        }];
        let layouts = CcOracle::parse_output("8 4 0 4\n", &requests).unwrap();
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].size, 8);
        assert_eq!(layouts[0].align, 4);
        assert_eq!(layouts[0].offsets.as_slice(), &[0, 4]);

        assert!(CcOracle::parse_output("8 4 0\n", &requests).is_err());
        assert!(CcOracle::parse_output("", &requests).is_err());
    }
}
