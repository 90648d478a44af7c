// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE, LICENSE.additional and CONTRIBUTING.

use std::{any::Any, fmt::Display};

use zax_types::{
    dialect::{Cpu, CpuMode, Dialect, Features},
    CompileError,
};

use crate::float::FloatFormat;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct OptionError {
    pub message: String,
}

impl OptionError {
    pub fn new(message: &str) -> OptionError {
        OptionError {
            message: message.to_owned(),
        }
    }
}

impl Display for OptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for OptionError {}

impl CompileError for OptionError {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The assembler configuration built from the command-line surface.
/// The default is `-march=z80+xyhl+infc`.
#[derive(Debug, PartialEq, Clone)]
pub struct Config {
    pub dialect: Dialect,
    pub fp_single: Option<FloatFormat>,
    pub fp_double: Option<FloatFormat>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            dialect: Dialect::default(),
            fp_single: None,
            fp_double: None,
        }
    }
}

impl Config {
    pub fn parse_args<I>(args: I) -> Result<Config, OptionError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut config = Config::default();
        for arg in args {
            config.parse_option(arg.as_ref())?;
        }
        Ok(config)
    }

    pub fn parse_option(&mut self, arg: &str) -> Result<(), OptionError> {
        let opt = arg.trim_start_matches('-');

        if let Some(spec) = opt.strip_prefix("march=") {
            return set_march(&mut self.dialect, spec);
        }
        if let Some(format) = opt.strip_prefix("fp-s=") {
            self.fp_single = parse_float_format(format)?;
            return Ok(());
        }
        if let Some(format) = opt.strip_prefix("fp-d=") {
            self.fp_double = parse_float_format(format)?;
            return Ok(());
        }
        if let Some(list) = opt
            .strip_prefix("with-inst=")
            .or_else(|| opt.strip_prefix("Wnins="))
        {
            return self.toggle_instruction_list(list, true);
        }
        if let Some(list) = opt
            .strip_prefix("without-inst=")
            .or_else(|| opt.strip_prefix("Fins="))
        {
            return self.toggle_instruction_list(list, false);
        }
        if let Some(text) = opt.strip_prefix("local-prefix=") {
            self.dialect.local_label_prefix = if text.is_empty() {
                None
            } else {
                Some(text.to_owned())
            };
            return Ok(());
        }

        match opt {
            "z80" => set_march(&mut self.dialect, "z80"),
            "r800" => set_march(&mut self.dialect, "r800"),
            "z180" => set_march(&mut self.dialect, "z180"),
            "ez80" => set_march(&mut self.dialect, "ez80"),
            "ez80-adl" => set_march(&mut self.dialect, "ez80+adl"),
            "sdcc" => {
                self.dialect.sdcc_compat = true;
                Ok(())
            }
            "colonless" => {
                self.dialect.colonless_labels = true;
                Ok(())
            }
            "ignore-undocumented-instructions"
            | "Wnud"
            | "warn-undocumented-instructions"
            | "Wud" => {
                self.accept_classes(Features::UNDOCUMENTED);
                Ok(())
            }
            "full"
            | "ignore-unportable-instructions"
            | "Wnup"
            | "warn-unportable-instructions"
            | "Wup" => {
                self.accept_classes(Features::UNDOCUMENTED.union(Features::UNPORTABLE));
                Ok(())
            }
            "strict" | "forbid-undocumented-instructions" | "Fud" => {
                if !matches!(self.dialect.cpu, Cpu::R800 | Cpu::Gbz80) {
                    self.dialect.accept &= !Features::UNDOCUMENTED;
                    self.dialect.reject |= Features::UNDOCUMENTED;
                }
                Ok(())
            }
            "forbid-unportable-instructions" | "Fup" => {
                self.dialect.accept &= !Features::UNPORTABLE;
                self.dialect.reject |= Features::UNPORTABLE;
                Ok(())
            }
            _ => Err(OptionError::new(&format!("unknown option: {}", arg))),
        }
    }

    // The class toggles never apply when the selected CPU is the GBZ80.
    fn accept_classes(&mut self, features: Features) {
        if self.dialect.cpu == Cpu::Gbz80 {
            return;
        }
        self.dialect.accept |= features;
        self.dialect.reject &= !features;
    }

    fn toggle_instruction_list(&mut self, list: &str, add: bool) -> Result<(), OptionError> {
        if self.dialect.cpu == Cpu::Gbz80 {
            return Ok(());
        }
        for name in list.split(',') {
            let feature = match name {
                "idx-reg-halves" => Features::IDX_HALF,
                "sli" => Features::SLI,
                "op-ii-ld" => Features::ROT_II_LD,
                "in-f-c" => Features::IN_F_C,
                "out-c-0" => Features::OUT_C_0,
                _ => {
                    return Err(OptionError::new(&format!(
                        "invalid INST in command line: {}",
                        name
                    )))
                }
            };
            if add {
                self.dialect.accept |= feature;
                self.dialect.reject &= !feature;
            } else {
                self.dialect.reject |= feature;
                self.dialect.accept &= !feature;
            }
        }
        Ok(())
    }
}

/// `-march=CPU[{+|-}EXT...]`.
pub fn set_march(dialect: &mut Dialect, spec: &str) -> Result<(), OptionError> {
    let cpu_len = spec.find(['+', '-']).unwrap_or(spec.len());
    let cpu_name = spec[..cpu_len].to_ascii_lowercase();

    let (cpu, reject) = match cpu_name.as_str() {
        "z80" => (Cpu::Z80, Features::empty()),
        "ez80" => (Cpu::Ez80, Features::empty()),
        "gbz80" => (
            Cpu::Gbz80,
            Features::UNDOCUMENTED.union(Features::UNPORTABLE),
        ),
        "r800" => (Cpu::R800, Features::UNPORTABLE),
        "z180" => (
            Cpu::Z180,
            Features::UNDOCUMENTED.union(Features::UNPORTABLE),
        ),
        "z80n" => (Cpu::Z80n, Features::empty()),
        _ => {
            return Err(OptionError::new(&format!(
                "Invalid CPU is specified: {}",
                spec
            )))
        }
    };

    dialect.cpu = cpu;
    dialect.accept = Features::empty();
    dialect.reject = reject;
    dialect.cpu_mode = CpuMode::Z80;

    let mut rest = &spec[cpu_len..];
    while !rest.is_empty() {
        let add = rest.starts_with('+');
        let body = &rest[1..];
        let ext_len = body.find(['+', '-']).unwrap_or(body.len());
        let ext = body[..ext_len].to_ascii_lowercase();
        rest = &body[ext_len..];

        let features = match ext.as_str() {
            "full" => Features::UNDOCUMENTED.union(Features::UNPORTABLE),
            "adl" => {
                if add && cpu != Cpu::Ez80 {
                    return Err(OptionError::new(&format!(
                        "Invalid EXTENSION is specified: {}",
                        ext
                    )));
                }
                dialect.cpu_mode = if add { CpuMode::Adl } else { CpuMode::Z80 };
                continue;
            }
            "xyhl" => Features::IDX_HALF,
            "infc" => Features::IN_F_C,
            "outc0" => Features::OUT_C_0,
            "sli" => Features::SLI,
            "xdcb" => Features::ROT_II_LD,
            _ => {
                return Err(OptionError::new(&format!(
                    "Invalid EXTENSION is specified: {}",
                    ext
                )))
            }
        };

        if add {
            dialect.accept |= features;
            dialect.reject &= !features;
        } else {
            dialect.accept &= !features;
            dialect.reject |= features;
        }
    }

    Ok(())
}

fn parse_float_format(name: &str) -> Result<Option<FloatFormat>, OptionError> {
    match name.to_ascii_lowercase().as_str() {
        "zeda32" => Ok(Some(FloatFormat::Zeda32)),
        "math48" => Ok(Some(FloatFormat::Math48)),
        "half" => Ok(Some(FloatFormat::Half)),
        "single" => Ok(Some(FloatFormat::Single)),
        "double" => Ok(Some(FloatFormat::Double)),
        "ieee754" => Err(OptionError::new(&format!(
            "invalid floating point numbers type `{}'",
            name
        ))),
        // an unrecognized format name leaves the default encoder in place
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use zax_types::dialect::CpuMode;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dialect.cpu, Cpu::Z80);
        assert_eq!(config.dialect.accept, Features::UNDOCUMENTED);
        assert_eq!(config.dialect.reject, Features::UNPORTABLE);
    }

    #[test]
    fn test_march_with_extensions() {
        let config = Config::parse_args(&["-march=z80+sli-infc"]).unwrap();
        assert!(config.dialect.accept.contains(Features::SLI));
        assert!(config.dialect.reject.contains(Features::IN_F_C));
        assert!(!config.dialect.accept.contains(Features::IN_F_C));
    }

    #[test]
    fn test_march_explicit_z80_only_warns_unportable() {
        let config = Config::parse_args(&["-march=z80"]).unwrap();
        assert_eq!(config.dialect.reject, Features::empty());
    }

    #[test]
    fn test_march_ez80_adl() {
        let config = Config::parse_args(&["-ez80-adl"]).unwrap();
        assert_eq!(config.dialect.cpu, Cpu::Ez80);
        assert_eq!(config.dialect.cpu_mode, CpuMode::Adl);
    }

    #[test]
    fn test_march_adl_requires_ez80() {
        let err = Config::parse_args(&["-march=z80+adl"]).unwrap_err();
        assert_eq!(err.message, "Invalid EXTENSION is specified: adl");
    }

    #[test]
    fn test_invalid_cpu() {
        let err = Config::parse_args(&["-march=z8000"]).unwrap_err();
        assert_eq!(err.message, "Invalid CPU is specified: z8000");
    }

    #[test]
    fn test_invalid_extension() {
        let err = Config::parse_args(&["-march=z80+turbo"]).unwrap_err();
        assert_eq!(err.message, "Invalid EXTENSION is specified: turbo");
    }

    #[test]
    fn test_with_inst_list() {
        let config = Config::parse_args(&["-march=z80", "-with-inst=sli,out-c-0"]).unwrap();
        assert!(config.dialect.accept.contains(Features::SLI));
        assert!(config.dialect.accept.contains(Features::OUT_C_0));

        let config = Config::parse_args(&["-without-inst=idx-reg-halves"]).unwrap();
        assert!(config.dialect.reject.contains(Features::IDX_HALF));
    }

    #[test]
    fn test_invalid_inst_list() {
        let err = Config::parse_args(&["-with-inst=frobnicate"]).unwrap_err();
        assert_eq!(err.message, "invalid INST in command line: frobnicate");
    }

    #[test]
    fn test_toggles_skip_gbz80() {
        let config = Config::parse_args(&["-march=gbz80", "-full", "-with-inst=sli"]).unwrap();
        assert_eq!(config.dialect.accept, Features::empty());
    }

    #[test]
    fn test_strict_rejects_undocumented() {
        let config = Config::parse_args(&["-strict"]).unwrap();
        assert!(config.dialect.reject.contains(Features::UNDOCUMENTED));
        assert_eq!(config.dialect.accept, Features::empty());
    }

    #[test]
    fn test_fp_formats() {
        let config = Config::parse_args(&["-fp-s=zeda32", "-fp-d=math48"]).unwrap();
        assert_eq!(config.fp_single, Some(FloatFormat::Zeda32));
        assert_eq!(config.fp_double, Some(FloatFormat::Math48));

        let err = Config::parse_args(&["-fp-s=ieee754"]).unwrap_err();
        assert_eq!(
            err.message,
            "invalid floating point numbers type `ieee754'"
        );
    }
}
