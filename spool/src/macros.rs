/// Define a combinational primitive with a single output port.
///
/// ```ignore
/// comb_primitive!(StdAdd[WIDTH](left: WIDTH, right: WIDTH) -> (out: WIDTH) {
///     Ok(Value::from(left.as_u64().wrapping_add(right.as_u64()), WIDTH))
/// });
/// ```
///
/// The macro implements the [crate::primitives::Primitive] trait for the
/// struct as well as `new(params, full_name)`. Port and output widths name
/// parameters of the primitive; the body evaluates to a
/// `WeftResult<Value>` with the declared ports bound as [crate::values::Value]
/// locals and the parameters as `u64` locals.
#[macro_export]
macro_rules! comb_primitive {
    ($(#[$meta:meta])* $name:ident[
        $( $param:ident ),+
    ]( $( $port:ident : $width:ident ),+ ) ->
     ( $out:ident : $out_width:ident ) $execute:block
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        #[allow(non_snake_case)]
        pub struct $name {
            $($param: u64,)+
            full_name: weft_utils::Id,
            ports: Vec<weft_ir::PortDef>,
        }

        impl $name {
            pub fn new(params: &weft_ir::Binding, full_name: weft_utils::Id) -> Self {
                $(
                    let $param = $crate::primitives::prim_utils::get_param(
                        params,
                        stringify!($param),
                    )
                    .unwrap_or_else(|| {
                        panic!(
                            "Missing `{}` param from {} binding",
                            stringify!($param),
                            stringify!($name)
                        )
                    });
                )+
                let ports = vec![
                    $(weft_ir::PortDef::new(
                        stringify!($port),
                        $width,
                        weft_ir::Direction::Input,
                    ),)+
                    weft_ir::PortDef::new(
                        stringify!($out),
                        $out_width,
                        weft_ir::Direction::Output,
                    ),
                ];
                Self {
                    $($param,)+
                    full_name,
                    ports,
                }
            }
        }

        impl $crate::primitives::Named for $name {
            fn get_full_name(&self) -> weft_utils::Id {
                self.full_name
            }
        }

        impl $crate::primitives::Primitive for $name {
            fn is_comb(&self) -> bool {
                true
            }

            fn ports(&self) -> &[weft_ir::PortDef] {
                &self.ports
            }

            fn validate(
                &self,
                inputs: &[(weft_utils::Id, $crate::values::Value)],
            ) -> weft_utils::WeftResult<()> {
                for (id, v) in inputs {
                    match id.as_str() {
                        $(stringify!($port) => {
                            if v.width() != self.$width {
                                return Err(weft_utils::Error::Misc(format!(
                                    "{}: input {} has width {} but expects {}",
                                    self.full_name,
                                    id,
                                    v.width(),
                                    self.$width
                                )));
                            }
                        })+
                        p => {
                            return Err(weft_utils::Error::PortNotFound {
                                instance: self.full_name,
                                port: weft_utils::Id::new(p),
                            })
                        }
                    }
                }
                Ok(())
            }

            #[allow(non_snake_case, unused)]
            fn execute(
                &self,
                inputs: &[(weft_utils::Id, $crate::values::Value)],
                _state: &mut $crate::environment::PrimitiveState,
            ) -> weft_utils::WeftResult<Vec<(weft_utils::Id, $crate::values::Value)>> {
                $(
                    let $port: $crate::values::Value =
                        $crate::primitives::prim_utils::get_input(inputs, stringify!($port))
                            .ok_or_else(|| {
                                weft_utils::Error::Misc(format!(
                                    "{}: no value for port {}",
                                    self.full_name,
                                    stringify!($port)
                                ))
                            })?;
                )+
                $(let $param: u64 = self.$param;)+
                let $out: $crate::values::Value = $execute?;
                Ok(vec![(weft_utils::Id::new(stringify!($out)), $out)])
            }
        }
    };
}

/// Define a combinational comparator: like [comb_primitive!] but the single
/// `out` port is one bit wide and the body evaluates to a
/// `WeftResult<bool>`.
#[macro_export]
macro_rules! comb_predicate {
    ($(#[$meta:meta])* $name:ident[
        $( $param:ident ),+
    ]( $( $port:ident : $width:ident ),+ ) $execute:block
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        #[allow(non_snake_case)]
        pub struct $name {
            $($param: u64,)+
            full_name: weft_utils::Id,
            ports: Vec<weft_ir::PortDef>,
        }

        impl $name {
            pub fn new(params: &weft_ir::Binding, full_name: weft_utils::Id) -> Self {
                $(
                    let $param = $crate::primitives::prim_utils::get_param(
                        params,
                        stringify!($param),
                    )
                    .unwrap_or_else(|| {
                        panic!(
                            "Missing `{}` param from {} binding",
                            stringify!($param),
                            stringify!($name)
                        )
                    });
                )+
                let ports = vec![
                    $(weft_ir::PortDef::new(
                        stringify!($port),
                        $width,
                        weft_ir::Direction::Input,
                    ),)+
                    weft_ir::PortDef::new("out", 1, weft_ir::Direction::Output),
                ];
                Self {
                    $($param,)+
                    full_name,
                    ports,
                }
            }
        }

        impl $crate::primitives::Named for $name {
            fn get_full_name(&self) -> weft_utils::Id {
                self.full_name
            }
        }

        impl $crate::primitives::Primitive for $name {
            fn is_comb(&self) -> bool {
                true
            }

            fn ports(&self) -> &[weft_ir::PortDef] {
                &self.ports
            }

            fn validate(
                &self,
                inputs: &[(weft_utils::Id, $crate::values::Value)],
            ) -> weft_utils::WeftResult<()> {
                for (id, v) in inputs {
                    match id.as_str() {
                        $(stringify!($port) => {
                            if v.width() != self.$width {
                                return Err(weft_utils::Error::Misc(format!(
                                    "{}: input {} has width {} but expects {}",
                                    self.full_name,
                                    id,
                                    v.width(),
                                    self.$width
                                )));
                            }
                        })+
                        p => {
                            return Err(weft_utils::Error::PortNotFound {
                                instance: self.full_name,
                                port: weft_utils::Id::new(p),
                            })
                        }
                    }
                }
                Ok(())
            }

            #[allow(non_snake_case, unused)]
            fn execute(
                &self,
                inputs: &[(weft_utils::Id, $crate::values::Value)],
                _state: &mut $crate::environment::PrimitiveState,
            ) -> weft_utils::WeftResult<Vec<(weft_utils::Id, $crate::values::Value)>> {
                $(
                    let $port: $crate::values::Value =
                        $crate::primitives::prim_utils::get_input(inputs, stringify!($port))
                            .ok_or_else(|| {
                                weft_utils::Error::Misc(format!(
                                    "{}: no value for port {}",
                                    self.full_name,
                                    stringify!($port)
                                ))
                            })?;
                )+
                $(let $param: u64 = self.$param;)+
                let flag: bool = $execute?;
                Ok(vec![(
                    weft_utils::Id::new("out"),
                    $crate::values::Value::from(flag as u64, 1),
                )])
            }
        }
    };
}
