use crate::{
    file::parser::Parser,
    signatures::{
        ClassName, ClassSignature, MethodDescriptor, MethodSignature, TypeArgument, TypeInfo,
        TypeParameter, TypeSignature,
    },
    Error::RecursionLimit,
    Result,
};

const MAX_RECURSION_DEPTH: usize = 50;

/// Parser for descriptors and generic `Signature` attribute strings.
///
/// Both grammars are ASCII-structured, so the parser walks the UTF-8 bytes with the crate's
/// cursor. Generic parsing produces [`TypeInfo`] values whose type variables are not yet bound;
/// [`Resolver`] attaches bounds afterwards.
pub struct SignatureParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Create a new parser over a descriptor or signature string.
    #[must_use]
    pub fn new(data: &'a str) -> Self {
        SignatureParser {
            parser: Parser::new(data.as_bytes()),
            depth: 0,
        }
    }

    fn text(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.parser.data()[start..self.parser.pos()]).into_owned()
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        let found = self.parser.read_be::<u8>()?;
        if found != expected {
            return Err(malformed_error!(
                "Expected '{}' but found '{}' at {}",
                expected as char,
                found as char,
                self.parser.pos() - 1
            ));
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        if self.parser.has_more_data() {
            return Err(malformed_error!(
                "Trailing characters in signature at {}",
                self.parser.pos()
            ));
        }
        Ok(())
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }
        Ok(())
    }

    fn read_until(&mut self, stops: &[u8]) -> Result<String> {
        let start = self.parser.pos();
        while !stops.contains(&self.parser.peek_byte()?) {
            self.parser.advance_by(1)?;
        }
        if self.parser.pos() == start {
            return Err(malformed_error!("Empty identifier at {}", start));
        }
        Ok(self.text(start))
    }

    /// Parse one field descriptor, `I`, `[Ljava/lang/String;`.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] on invalid input.
    pub fn parse_field_type(&mut self) -> Result<TypeSignature> {
        let code = self.parser.read_be::<u8>()?;
        match code {
            b'L' => {
                let name = self.read_until(b";")?;
                self.expect(b';')?;
                Ok(TypeSignature::Reference(ClassName::new(&name)))
            }
            b'[' => {
                let mut dimensions: u8 = 1;
                while self.parser.peek_byte()? == b'[' {
                    self.parser.advance_by(1)?;
                    dimensions = dimensions
                        .checked_add(1)
                        .ok_or_else(|| malformed_error!("Array dimensions exceed 255"))?;
                }
                let element = self.parse_field_type()?;
                Ok(element.array_of(dimensions))
            }
            b'V' => Err(malformed_error!("void is not a field type")),
            other => TypeSignature::from_primitive_code(other)
                .ok_or_else(|| malformed_error!("Invalid descriptor character '{}'", other as char)),
        }
    }

    /// Parse a complete field descriptor and reject trailing input.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] on invalid input.
    pub fn parse_field_descriptor(&mut self) -> Result<TypeSignature> {
        let signature = self.parse_field_type()?;
        self.finish()?;
        Ok(signature)
    }

    /// Parse a complete `(params)ret` method descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] on invalid input.
    pub fn parse_method_descriptor(&mut self) -> Result<MethodDescriptor> {
        self.expect(b'(')?;
        let mut params = Vec::new();
        while self.parser.peek_byte()? != b')' {
            params.push(self.parse_field_type()?);
        }
        self.expect(b')')?;
        let ret = if self.parser.peek_byte()? == b'V' {
            self.parser.advance_by(1)?;
            TypeSignature::Void
        } else {
            self.parse_field_type()?
        };
        self.finish()?;
        Ok(MethodDescriptor::new(params, ret))
    }

    fn parse_java_type(&mut self) -> Result<TypeInfo> {
        match self.parser.peek_byte()? {
            b'L' | b'T' | b'[' => self.parse_reference_type(),
            code => {
                self.parser.advance_by(1)?;
                match TypeSignature::from_primitive_code(code) {
                    Some(TypeSignature::Void) | None => Err(malformed_error!(
                        "Invalid signature character '{}'",
                        code as char
                    )),
                    Some(primitive) => Ok(TypeInfo::Plain(primitive)),
                }
            }
        }
    }

    fn parse_reference_type(&mut self) -> Result<TypeInfo> {
        self.enter()?;
        let result = match self.parser.read_be::<u8>()? {
            b'L' => self.parse_class_type(),
            b'T' => {
                let name = self.read_until(b";")?;
                self.expect(b';')?;
                Ok(TypeInfo::Variable {
                    name,
                    bounds: Vec::new(),
                })
            }
            b'[' => {
                let component = self.parse_java_type()?;
                Ok(match component {
                    TypeInfo::Plain(signature) => TypeInfo::Plain(signature.array_of(1)),
                    TypeInfo::Array {
                        dimensions,
                        component,
                    } => TypeInfo::Array {
                        dimensions: dimensions.saturating_add(1),
                        component,
                    },
                    generic => TypeInfo::Array {
                        dimensions: 1,
                        component: Box::new(generic),
                    },
                })
            }
            other => Err(malformed_error!(
                "Invalid reference type character '{}'",
                other as char
            )),
        };
        self.depth -= 1;
        result
    }

    fn parse_class_type(&mut self) -> Result<TypeInfo> {
        let mut name = self.read_until(b"<.;")?;
        let mut arguments = self.parse_type_arguments()?;
        while self.parser.peek_byte()? == b'.' {
            self.parser.advance_by(1)?;
            let inner = self.read_until(b"<.;")?;
            name.push('$');
            name.push_str(&inner);
            arguments = self.parse_type_arguments()?;
        }
        self.expect(b';')?;

        let raw = ClassName::new(&name);
        if arguments.is_empty() {
            Ok(TypeInfo::Plain(TypeSignature::Reference(raw)))
        } else {
            Ok(TypeInfo::Parameterized { raw, arguments })
        }
    }

    fn parse_type_arguments(&mut self) -> Result<Vec<TypeArgument>> {
        if self.parser.peek_byte()? != b'<' {
            return Ok(Vec::new());
        }
        self.parser.advance_by(1)?;

        let mut arguments = Vec::new();
        while self.parser.peek_byte()? != b'>' {
            let argument = match self.parser.peek_byte()? {
                b'*' => {
                    self.parser.advance_by(1)?;
                    TypeArgument::Any
                }
                b'+' => {
                    self.parser.advance_by(1)?;
                    TypeArgument::Extends(self.parse_reference_type()?)
                }
                b'-' => {
                    self.parser.advance_by(1)?;
                    TypeArgument::Super(self.parse_reference_type()?)
                }
                _ => TypeArgument::Exact(self.parse_reference_type()?),
            };
            arguments.push(argument);
        }
        self.expect(b'>')?;

        if arguments.is_empty() {
            return Err(malformed_error!("Empty type argument list"));
        }
        Ok(arguments)
    }

    fn parse_type_parameters(&mut self) -> Result<Vec<TypeParameter>> {
        if self.parser.peek_byte()? != b'<' {
            return Ok(Vec::new());
        }
        self.parser.advance_by(1)?;

        let mut parameters = Vec::new();
        while self.parser.peek_byte()? != b'>' {
            let name = self.read_until(b":")?;
            self.expect(b':')?;
            let mut bounds = Vec::new();
            if !matches!(self.parser.peek_byte()?, b':' | b'>') {
                bounds.push(self.parse_reference_type()?);
            }
            while self.parser.peek_byte()? == b':' {
                self.parser.advance_by(1)?;
                bounds.push(self.parse_reference_type()?);
            }
            if bounds.is_empty() {
                bounds.push(TypeInfo::Plain(TypeSignature::object()));
            }
            parameters.push(TypeParameter { name, bounds });
        }
        self.expect(b'>')?;
        Ok(parameters)
    }

    /// Parse a class `Signature` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] on invalid input.
    pub fn parse_class_signature(&mut self) -> Result<ClassSignature> {
        let declared = self.parse_type_parameters()?;
        let superclass = self.parse_reference_type()?;
        let mut interfaces = Vec::new();
        while self.parser.has_more_data() {
            interfaces.push(self.parse_reference_type()?);
        }

        let mut resolver = Resolver::new(&[], &declared);
        let type_parameters = resolver.resolve_parameters();
        let superclass = resolver.resolve(superclass);
        let interfaces = interfaces
            .into_iter()
            .map(|interface| resolver.resolve(interface))
            .collect();

        Ok(ClassSignature {
            type_parameters,
            superclass,
            interfaces,
        })
    }

    /// Parse a method `Signature` attribute; `outer` are the resolved parameters of the declaring
    /// class.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] on invalid input.
    pub fn parse_method_signature(&mut self, outer: &[TypeParameter]) -> Result<MethodSignature> {
        let declared = self.parse_type_parameters()?;
        self.expect(b'(')?;
        let mut parameters = Vec::new();
        while self.parser.peek_byte()? != b')' {
            parameters.push(self.parse_java_type()?);
        }
        self.expect(b')')?;
        let return_type = if self.parser.peek_byte()? == b'V' {
            self.parser.advance_by(1)?;
            TypeInfo::Plain(TypeSignature::Void)
        } else {
            self.parse_java_type()?
        };
        let mut throws = Vec::new();
        while self.parser.has_more_data() {
            self.expect(b'^')?;
            throws.push(self.parse_reference_type()?);
        }

        let mut resolver = Resolver::new(outer, &declared);
        Ok(MethodSignature {
            type_parameters: resolver.resolve_parameters(),
            parameters: parameters
                .into_iter()
                .map(|parameter| resolver.resolve(parameter))
                .collect(),
            return_type: resolver.resolve(return_type),
            throws: throws.into_iter().map(|t| resolver.resolve(t)).collect(),
        })
    }

    /// Parse a field `Signature` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] on invalid input.
    pub fn parse_field_signature(&mut self, outer: &[TypeParameter]) -> Result<TypeInfo> {
        let info = self.parse_reference_type()?;
        self.finish()?;
        Ok(Resolver::new(outer, &[]).resolve(info))
    }
}

/// Attaches bounds to type variables.
///
/// `local` parameters are still unresolved and are resolved on demand; `outer` parameters (the
/// declaring class's, when resolving a member) are already resolved. A variable referenced while
/// its own bounds are being resolved, or one declared nowhere in scope, gets an unknown bound.
/// A wildcard whose bound itself contains a wildcard resolves to an unknown bound as well.
pub(crate) struct Resolver<'s> {
    outer: &'s [TypeParameter],
    local: &'s [TypeParameter],
    in_progress: Vec<String>,
}

impl<'s> Resolver<'s> {
    pub(crate) fn new(outer: &'s [TypeParameter], local: &'s [TypeParameter]) -> Self {
        Resolver {
            outer,
            local,
            in_progress: Vec::new(),
        }
    }

    fn resolve_parameters(&mut self) -> Vec<TypeParameter> {
        let local = self.local;
        local
            .iter()
            .map(|parameter| {
                self.in_progress.push(parameter.name.clone());
                let bounds = parameter
                    .bounds
                    .iter()
                    .map(|bound| self.resolve(bound.clone()))
                    .collect();
                self.in_progress.pop();
                TypeParameter {
                    name: parameter.name.clone(),
                    bounds,
                }
            })
            .collect()
    }

    pub(crate) fn resolve(&mut self, info: TypeInfo) -> TypeInfo {
        match info {
            TypeInfo::Variable { name, .. } => {
                if self.in_progress.contains(&name) {
                    return TypeInfo::Variable {
                        name,
                        bounds: vec![TypeInfo::Unknown],
                    };
                }
                let (local, outer) = (self.local, self.outer);
                if let Some(declared) = local.iter().find(|p| p.name == name) {
                    self.in_progress.push(name.clone());
                    let bounds = declared
                        .bounds
                        .iter()
                        .map(|bound| self.resolve(bound.clone()))
                        .collect();
                    self.in_progress.pop();
                    return TypeInfo::Variable { name, bounds };
                }
                match outer.iter().find(|p| p.name == name) {
                    Some(declared) => TypeInfo::Variable {
                        name,
                        bounds: declared.bounds.clone(),
                    },
                    None => TypeInfo::Variable {
                        name,
                        bounds: vec![TypeInfo::Unknown],
                    },
                }
            }
            TypeInfo::Parameterized { raw, arguments } => TypeInfo::Parameterized {
                raw,
                arguments: arguments
                    .into_iter()
                    .map(|argument| self.resolve_argument(argument))
                    .collect(),
            },
            TypeInfo::Array {
                dimensions,
                component,
            } => TypeInfo::Array {
                dimensions,
                component: Box::new(self.resolve(*component)),
            },
            other => other,
        }
    }

    fn resolve_argument(&mut self, argument: TypeArgument) -> TypeArgument {
        match argument {
            TypeArgument::Any => TypeArgument::Any,
            TypeArgument::Exact(info) => TypeArgument::Exact(self.resolve(info)),
            TypeArgument::Extends(info) if contains_wildcard(&info) => {
                TypeArgument::Extends(TypeInfo::Unknown)
            }
            TypeArgument::Super(info) if contains_wildcard(&info) => {
                TypeArgument::Super(TypeInfo::Unknown)
            }
            TypeArgument::Extends(info) => TypeArgument::Extends(self.resolve(info)),
            TypeArgument::Super(info) => TypeArgument::Super(self.resolve(info)),
        }
    }
}

fn contains_wildcard(info: &TypeInfo) -> bool {
    match info {
        TypeInfo::Parameterized { arguments, .. } => arguments.iter().any(|argument| {
            argument.is_wildcard()
                || matches!(argument, TypeArgument::Exact(inner) if contains_wildcard(inner))
        }),
        TypeInfo::Array { component, .. } => contains_wildcard(component),
        _ => false,
    }
}
