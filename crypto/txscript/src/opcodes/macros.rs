/// Encoding of an opcode and its push data, for either a fixed length (a literal counting the
/// opcode byte itself) or a length prefix type (u8, u16 or u32, little endian).
macro_rules! opcode_serde {
    ($type:ty) => {
        fn serialize(&self) -> Vec<u8> {
            let length = self.data.len() as $type;
            [[self.value()].as_slice(), length.to_le_bytes().as_slice(), self.data.as_slice()].concat()
        }

        fn encoded_len(&self) -> usize {
            1 + size_of::<$type>() + self.data.len()
        }

        fn deserialize<'i, I: Iterator<Item = &'i u8>, C: TxContext>(
            it: &mut I,
        ) -> Result<Box<dyn OpCodeImplementation<C>>, TxScriptError>
        where
            Self: Sized,
        {
            match it.take(size_of::<$type>()).copied().collect::<Vec<u8>>().try_into() {
                Ok(bytes) => {
                    let length = <$type>::from_le_bytes(bytes) as usize;
                    let data: Vec<u8> = it.take(length).copied().collect();
                    if data.len() != length {
                        return Err(TxScriptError::MalformedPush(length, data.len()));
                    }
                    Ok(Box::new(Self { data }))
                }
                Err(bytes) => Err(TxScriptError::MalformedPushSize(bytes)),
            }
        }
    };
    ($length:literal) => {
        fn serialize(&self) -> Vec<u8> {
            [[self.value()].as_slice(), self.data.as_slice()].concat()
        }

        fn encoded_len(&self) -> usize {
            $length
        }

        fn deserialize<'i, I: Iterator<Item = &'i u8>, C: TxContext>(
            it: &mut I,
        ) -> Result<Box<dyn OpCodeImplementation<C>>, TxScriptError>
        where
            Self: Sized,
        {
            let data: Vec<u8> = it.take($length - 1).copied().collect();
            if data.len() != $length - 1 {
                return Err(TxScriptError::MalformedPush($length - 1, data.len()));
            }
            Ok(Box::new(Self { data }))
        }
    };
}

macro_rules! opcode_init {
    ($type:ty, $data:ident) => {{
        if $data.len() > <$type>::MAX as usize {
            return Err(TxScriptError::MalformedPush(<$type>::MAX as usize, $data.len()));
        }
        Ok(Box::new(Self { data: $data }))
    }};
    ($length:literal, $data:ident) => {{
        if $data.len() != $length - 1 {
            return Err(TxScriptError::MalformedPush($length - 1, $data.len()));
        }
        Ok(Box::new(Self { data: $data }))
    }};
}

macro_rules! opcode_impl {
    ($name:ident, $num:literal, $length:tt, $code:expr, $self:ident, $vm:ident) => {
        type $name = OpCode<$num>;

        impl OpcodeSerialization for $name {
            opcode_serde!($length);
        }

        impl<C: TxContext> OpCodeExecution<C> for $name {
            fn empty() -> Result<Box<dyn OpCodeImplementation<C>>, TxScriptError> {
                let data: Vec<u8> = vec![];
                opcode_init!($length, data)
            }

            fn new(data: Vec<u8>) -> Result<Box<dyn OpCodeImplementation<C>>, TxScriptError> {
                opcode_init!($length, data)
            }

            #[allow(unused_variables)]
            fn execute(&$self, $vm: &mut TxScriptEngine<C>) -> OpCodeResult {
                $code
            }
        }

        impl<C: TxContext> OpCodeImplementation<C> for $name {}
    };
}

/// Declares the whole opcode table. Every entry yields a `codes::<Name>` byte constant, an
/// `OpCode<N>` alias implementing its execution, and an arm of `deserialize_next_opcode`.
macro_rules! opcode_list {
    ( $( opcode $(|$alias:ident|)? $name:ident<$num:literal, $length:tt>($self:ident, $vm:ident) $code:expr ) *) => {
        pub mod codes {
            $(
                #[allow(non_upper_case_globals)]
                #[allow(dead_code)]
                pub const $name: u8 = $num;

                $(
                    #[allow(non_upper_case_globals)]
                    #[allow(dead_code)]
                    pub const $alias: u8 = $num;
                )?
            )*
        }

        $(
            opcode_impl!($name, $num, $length, $code, $self, $vm);

            $(
                #[allow(dead_code)]
                type $alias = $name;
            )?
        )*

        pub fn deserialize_next_opcode<'i, I: Iterator<Item = &'i u8>, C: TxContext>(
            it: &mut I,
        ) -> Option<Result<Box<dyn OpCodeImplementation<C>>, TxScriptError>> {
            match it.next() {
                Some(opcode_num) => match *opcode_num {
                    $(
                        $num => Some($name::deserialize(it)),
                    )*
                },
                None => None,
            }
        }
    };
}
